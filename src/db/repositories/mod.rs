//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod application;
pub mod category;
pub mod conversation;
pub mod listing;
pub mod payment;
pub mod session;
pub mod user;

pub use application::{ApplicationRepository, SqlxApplicationRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use conversation::{ConversationRepository, SqlxConversationRepository};
pub use listing::{ListingRepository, SqlxListingRepository};
pub use payment::{PaymentRepository, SqlxPaymentRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
