//! Query helpers over a [`Database`](crate::database::Database) for the board's two tables.

mod message;
mod user;

pub use message::{Message, MessageModel, NewMessage};
pub use user::{NewUser, User, UserModel};
