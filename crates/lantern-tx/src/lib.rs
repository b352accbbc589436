pub mod builder;
pub mod fee;
pub mod selector;
pub mod submit;

pub use builder::{BuiltTransfer, TransferBuilder};
pub use fee::{FeePolicy, FlatFee};
pub use selector::{select_and_reserve, Reservation};
pub use submit::SubmissionController;
