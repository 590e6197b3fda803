//! Tapflow - a WhatsApp conversational front-end for ride matching, marketplace
//! listings, funding baskets, document intake and payment codes.

// ============================================================================
// Ingress
// ============================================================================

pub mod auth;
pub mod config;
pub mod handlers;
pub mod idempotency;
pub mod server;

// ============================================================================
// Conversation core
// ============================================================================

pub mod flows;
pub mod guard;
pub mod router;
pub mod state;
pub mod store;

// ============================================================================
// Outbound and collaborators
// ============================================================================

pub mod cache;
pub mod channel;
pub mod extraction;
pub mod matching;
pub mod share;
