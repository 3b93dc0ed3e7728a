//! Groups Module
//!
//! Group lifecycle, membership checks and the per-group notice board.
//!
//! - **`guard`** - `MembershipGuard`: authorize, join, leave, create, delete
//! - **`announcements`** - `AnnouncementBoard`
//! - **`handlers`** - HTTP handlers under `/api/groups` and `/api/announcements`

pub mod guard;
pub mod announcements;
pub mod handlers;

pub use announcements::AnnouncementBoard;
pub use guard::{normalize_code, MembershipGuard};
