//! Services layer - Business logic
//!
//! This module contains the business logic of the marketplace.
//! Services are responsible for:
//! - Implementing business rules and role checks
//! - Coordinating between repositories and cache
//! - Handling validation and error cases

pub mod application;
pub mod category;
pub mod listing;
pub mod matching;
pub mod messaging;
pub mod password;
pub mod payment;
pub mod profile;
pub mod rate_limiter;
pub mod stats;
pub mod user;

pub use application::{ApplicationService, ApplicationServiceError};
pub use category::{generate_slug, CategoryService, CategoryServiceError};
pub use listing::{ListingService, ListingServiceError};
pub use matching::{
    score_listing_for_sponsor, score_sponsor_for_creator, MatchQuery, MatchScore,
    MatchingService, MatchingServiceError,
};
pub use messaging::{ConversationMessage, MessagingService, MessagingServiceError};
pub use password::{hash_password, verify_password};
pub use payment::{
    ChargeOutcome, FeeSchedule, PaymentProcessor, PaymentService, PaymentServiceError,
    SimulatedProcessor,
};
pub use profile::{ProfileService, ProfileServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use stats::{AdminStats, StatsService};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
