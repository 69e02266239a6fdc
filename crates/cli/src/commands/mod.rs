pub mod chat;
pub mod onboard;
pub mod replay;
pub mod status;
