pub mod chat;
pub mod tools_cmd;
