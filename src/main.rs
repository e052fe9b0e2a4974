use clap::Parser;
use disburse::application::credentials::CredentialManager;
use disburse::application::dispatcher::SideEffectDispatcher;
use disburse::application::engine::{PayoutEngine, RequestStats};
use disburse::config::ProviderConfig;
use disburse::domain::credential::{Provider, TokenGrant};
use disburse::domain::payment_request::PaymentRequest;
use disburse::domain::ports::BankGatewayRef;
use disburse::domain::{Actor, PaymentRequestId, Role, UserId};
use disburse::infrastructure::crypto::TokenCipher;
use disburse::infrastructure::in_memory::{
    InMemoryCredentialStore, InMemoryLedger, InMemoryPaymentRequestStore, InMemoryTransferStore,
};
use disburse::infrastructure::openbanking::OpenBankingClient;
use disburse::infrastructure::sandbox::{LogNotifier, SandboxGateway};
use disburse::interfaces::api::CreatePaymentBody;
use miette::{miette, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script, one JSON command per line
    input: PathBuf,

    /// Acting operator (approves and moves money)
    #[arg(long, default_value_t = 1)]
    user: UserId,

    /// Call the real provider configured via OPENBANKING_* instead of the
    /// offline sandbox. Requires TOKEN_ENCRYPTION_KEY and a stored grant.
    #[arg(long)]
    live: bool,
}

/// One line of the command script. Requests are addressed by a caller-chosen
/// `ref` label; ids are generated at creation time.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Command {
    Create {
        #[serde(rename = "ref")]
        label: String,
        #[serde(default)]
        requester: Option<UserId>,
        body: CreatePaymentBody,
    },
    Approve {
        #[serde(rename = "ref")]
        label: String,
    },
    Reject {
        #[serde(rename = "ref")]
        label: String,
        reason: String,
    },
    Settle {
        #[serde(rename = "ref")]
        label: String,
    },
    Transfer {
        #[serde(rename = "ref")]
        label: String,
    },
}

#[derive(Serialize)]
struct FinalState {
    requests: Vec<PaymentRequest>,
    stats: RequestStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let operator = Actor::new(cli.user, Role::Manager);

    let (gateway, cipher): (BankGatewayRef, TokenCipher) = if cli.live {
        let key = std::env::var("TOKEN_ENCRYPTION_KEY")
            .map_err(|_| miette!("TOKEN_ENCRYPTION_KEY is required with --live"))?;
        let client = OpenBankingClient::new(ProviderConfig::from_env()).into_diagnostic()?;
        (Arc::new(client), TokenCipher::from_base64_key(&key).into_diagnostic()?)
    } else {
        (Arc::new(SandboxGateway::new()), TokenCipher::ephemeral())
    };
    let credentials = Arc::new(CredentialManager::new(
        Arc::new(InMemoryCredentialStore::new()),
        cipher,
        vec![gateway.clone()],
    ));
    if !cli.live {
        // The sandbox has no authorization flow, so seed the operator's grant.
        credentials
            .store_grant(
                operator.user_id,
                Provider::OpenBanking,
                TokenGrant {
                    access_token: "sandbox-access".to_owned(),
                    refresh_token: "sandbox-refresh".to_owned(),
                    token_type: "Bearer".to_owned(),
                    scope: "login transfer inquiry".to_owned(),
                    expires_in: 3600,
                    subject_id: None,
                },
            )
            .await
            .into_diagnostic()?;
    }

    let dispatcher = SideEffectDispatcher::new(
        Arc::new(LogNotifier::default()),
        Arc::new(InMemoryLedger::new()),
    );
    let engine = PayoutEngine::new(
        Arc::new(InMemoryPaymentRequestStore::new()),
        Arc::new(InMemoryTransferStore::new()),
        credentials,
        gateway,
        dispatcher,
    );

    let script = std::fs::read_to_string(&cli.input).into_diagnostic()?;
    let mut labels: HashMap<String, PaymentRequestId> = HashMap::new();

    for (lineno, line) in script.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("line {}: unreadable command: {e}", lineno + 1);
                continue;
            }
        };
        if let Err(e) = run_command(&engine, &operator, &mut labels, command).await {
            eprintln!("line {}: {e}", lineno + 1);
        }
    }

    let state = FinalState {
        requests: engine.all().await.into_diagnostic()?,
        stats: engine.stats().await.into_diagnostic()?,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&state).into_diagnostic()?
    );
    Ok(())
}

async fn run_command(
    engine: &PayoutEngine,
    operator: &Actor,
    labels: &mut HashMap<String, PaymentRequestId>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Create {
            label,
            requester,
            body,
        } => {
            let requester = Actor::new(requester.unwrap_or(operator.user_id), Role::Staff);
            let input = body.into_new_request(requester.user_id).into_diagnostic()?;
            let request = engine.create(&requester, input).await.into_diagnostic()?;
            labels.insert(label, request.id);
        }
        Command::Approve { label } => {
            let id = resolve(labels, &label)?;
            engine.approve(operator, id).await.into_diagnostic()?;
        }
        Command::Reject { label, reason } => {
            let id = resolve(labels, &label)?;
            engine.reject(operator, id, &reason).await.into_diagnostic()?;
        }
        Command::Settle { label } => {
            let id = resolve(labels, &label)?;
            engine.settle(operator, id).await.into_diagnostic()?;
        }
        Command::Transfer { label } => {
            let id = resolve(labels, &label)?;
            engine
                .transfer_and_settle(operator, id, None)
                .await
                .into_diagnostic()?;
        }
    }
    Ok(())
}

fn resolve(labels: &HashMap<String, PaymentRequestId>, label: &str) -> Result<PaymentRequestId> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| miette!("unknown request ref '{label}'"))
}
