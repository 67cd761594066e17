//! # Room Test Utilities
//!
//! Shared test utilities for the watch room service.
//!
//! This crate provides:
//! - Request fixtures (`fixtures`)
//! - In-process client connections and a service harness (`mock_client`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let service = TestService::new();
//!     let mut alice = service.connect();
//!
//!     let (room_id, _) = alice.create_room("Alice").await;
//!     let mut bob = service.connect();
//!     bob.join_room(room_id, "Bob").await;
//!
//!     let events = alice.drain_events();
//!     assert!(events.iter().any(|e| e.name() == "user_joined"));
//! }
//! ```

pub mod fixtures;
pub mod mock_client;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_client::*;
