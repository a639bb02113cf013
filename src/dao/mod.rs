/// Challenge metadata, questions and reward/attempt bookkeeping.
pub mod challenge_store;
/// Room membership mirror.
pub mod membership;
/// Persisted model definitions.
pub mod models;
/// Storage error types shared by every store.
pub mod storage;
