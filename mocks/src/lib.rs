pub mod memory_storage_provider;
pub mod mock_acceptor;
pub mod mock_chain;
pub mod mock_channel_db;
pub mod mock_events;
pub mod mock_gossip;
pub mod mock_peer;
pub mod mock_signer;
pub mod mock_time;
pub mod mock_wallet;

pub use funding_manager;
