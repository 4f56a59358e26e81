//! Data models
//!
//! This module contains the data structures used throughout Blitz:
//! - Database entities (User, Session, Category, Listing, Application,
//!   Conversation, Participant, Message, Payment)
//! - Status enums and their state machines
//! - API input types and pagination helpers

mod application;
mod category;
mod conversation;
mod listing;
mod payment;
mod session;
mod user;

pub use application::{
    Application, ApplicationDetail, ApplicationStatus, CreateApplicationInput,
};
pub use category::{
    Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput, DEFAULT_CATEGORY_SLUG,
};
pub use conversation::{
    normalize_message, Conversation, ConversationSummary, Message, Participant, ParticipantInfo,
    StartConversationInput, MAX_MESSAGE_LENGTH,
};
pub use listing::{
    CreateListingInput, ListParams, Listing, ListingFilter, ListingStatus, PagedResult,
    UpdateListingInput,
};
pub use payment::{FeeBreakdown, Payment, PaymentStatus, PaymentTotals, MAX_AMOUNT_CENTS};
pub use session::Session;
pub use user::{UpdateProfileInput, User, UserRole, UserStatus};
