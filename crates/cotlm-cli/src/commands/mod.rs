pub mod chat;
pub mod check;
pub mod generate;
pub mod infer;
pub mod remote;
pub mod session;
pub mod train;
