#![forbid(unsafe_code)]

pub mod client_store;
pub mod kv;

pub use client_store::{
    ClientStore, DISCORD_VERIFIED_KEY, OFFICER_PROFILE_KEY, SAVED_OFFICER_LIST_KEY,
    SESSION_COOKIE_KEY,
};
pub use kv::{FileKvStore, InMemoryKvStore, KvStore, StorageError};
