//! Authentication Module
//!
//! User registration, login and session tokens.
//!
//! - **`users`** - Input normalisation and validation
//! - **`sessions`** - JWT issuance and verification, `Identity`
//! - **`credentials`** - `CredentialService` tying the store, bcrypt and tokens together
//! - **`handlers`** - HTTP handlers for the auth endpoints
//!
//! # Authentication Flow
//!
//! 1. **Register**: name, email and password → user created → JWT returned
//! 2. **Login**: email and password verified → JWT returned
//! 3. **Me**: JWT verified → user returned
//!
//! # Security
//!
//! - Passwords are hashed with bcrypt before storage
//! - Tokens are HS256 JWTs valid for 7 days by default
//! - Invalid credentials return 401 with one fixed message

/// Registration input rules
pub mod users;

/// JWT token generation and validation
pub mod sessions;

/// Credential service
pub mod credentials;

/// HTTP handlers for authentication endpoints
pub mod handlers;

pub use credentials::CredentialService;
pub use handlers::types::{AuthResponse, LoginRequest, RegisterRequest, UserResponse};
pub use handlers::{get_me, login, register};
pub use sessions::{Claims, Identity, TokenIssuer};
