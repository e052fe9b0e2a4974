pub mod crypto;
pub mod in_memory;
pub mod openbanking;
pub mod sandbox;
