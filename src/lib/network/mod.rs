pub mod candidate;
pub mod nat;

pub use candidate::{Candidate, CandidateType};
pub use nat::NatClassifier;
