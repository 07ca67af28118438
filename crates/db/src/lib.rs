pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{demo_property, DemoSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    BookingRepository, ConversationEventRepository, DeliveryLogRepository, DeliveryRecord,
    PropertyRepository, RepositoryError,
};
pub use store::{ConversationStore, StoredTurn};
