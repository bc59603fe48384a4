pub mod ai;
pub mod category;
pub mod context;
pub mod conversation;
pub mod datetime;
pub mod dialogue;
pub mod intent;
pub mod scheduling;
pub mod session;
pub mod text;
