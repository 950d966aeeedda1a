pub mod acquire;
pub mod measurements;
pub mod models;
pub mod normalize;

pub use acquire::{Acquirer, Acquisition};
pub use models::{ProductRecord, RawPayload};
pub use normalize::normalize;
