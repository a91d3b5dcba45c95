//! Authentication: password hashing, signed tokens, the mail seam used by
//! password resets, and the service tying them to the user model.

pub mod mailer;
pub mod password;
mod service;
pub mod token;

pub use mailer::{Email, LogMailer, Mailer, MemoryMailer};
pub use service::{AuthReply, AuthService, CookieOptions, CurrentUser, RESET_TOKEN_TTL_MINS, SIGNUP_FIELDS};
pub use token::{Claims, TokenSigner};
