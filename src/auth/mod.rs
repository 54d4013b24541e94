//! eID login brokering.
//!
//! Implements the OpenID-Connect authorization-code round trip: the login
//! redirect, the callback state machine (CSRF state check, code exchange,
//! ID token verification, session establishment), and the signing-key
//! provider the verification step reads from.

pub mod handlers;
pub mod identity;
pub mod keys;

pub use handlers::{CallbackParams, callback, current_user, destroy, login};
pub use identity::IdentityClaims;
pub use keys::{KeyProvider, SigningKey};
