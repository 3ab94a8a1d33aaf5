pub mod chat_user;
