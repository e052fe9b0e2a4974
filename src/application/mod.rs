pub mod credentials;
pub mod dispatcher;
pub mod engine;
pub mod locks;
