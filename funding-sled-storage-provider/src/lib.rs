//! # funding-sled-storage-provider
//! Storage provider for funding-manager using sled as underlying storage.

#![crate_name = "funding_sled_storage_provider"]
// Coding conventions
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(missing_docs)]

extern crate funding_manager;
extern crate sled;

use std::convert::TryInto;

use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, Txid};
use funding_manager::error::Error;
use funding_manager::opening::ChannelOpeningState;
use funding_manager::Storage;
use funding_messages::ShortChannelId;
use sled::{Db, Tree};

/// The tree holding the opening state of every channel currently in the
/// process of being opened.
const CHANNEL_OPENING_STATE_TREE: &[u8] = b"channelOpeningState";

/// Implementation of Storage interface using the sled DB backend.
pub struct SledStorageProvider {
    db: Db,
}

impl SledStorageProvider {
    /// Creates a new instance of a SledStorageProvider.
    pub fn new(path: &str) -> Result<Self, sled::Error> {
        Ok(SledStorageProvider {
            db: sled::open(path)?,
        })
    }

    fn opening_state_tree(&self) -> Result<Tree, Error> {
        self.db
            .open_tree(CHANNEL_OPENING_STATE_TREE)
            .map_err(|e| Error::Storage(format!("Error opening channel opening state tree: {}", e)))
    }
}

/// The canonical serialization of an outpoint: the 32 byte transaction hash
/// followed by the output index as 4 little endian bytes.
fn outpoint_key(funding_outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(&funding_outpoint.txid.to_byte_array());
    key[32..].copy_from_slice(&funding_outpoint.vout.to_le_bytes());
    key
}

/// Opening state values pack the state ordinal as 2 little endian bytes
/// followed by the short channel id as 8 big endian bytes.
fn serialize_opening_state(
    state: ChannelOpeningState,
    short_channel_id: ShortChannelId,
) -> [u8; 10] {
    let mut value = [0u8; 10];
    value[..2].copy_from_slice(&u16::from(state).to_le_bytes());
    value[2..].copy_from_slice(&short_channel_id.to_u64().to_be_bytes());
    value
}

fn deserialize_opening_state(value: &[u8]) -> Result<(ChannelOpeningState, ShortChannelId), Error> {
    if value.len() != 10 {
        return Err(Error::Storage(format!(
            "invalid opening state value length {}",
            value.len()
        )));
    }
    let ordinal = u16::from_le_bytes(value[..2].try_into().expect("checked length"));
    let state: ChannelOpeningState = ordinal.try_into()?;
    let short_channel_id =
        ShortChannelId::from_u64(u64::from_be_bytes(value[2..].try_into().expect("checked length")));
    Ok((state, short_channel_id))
}

fn deserialize_outpoint_key(key: &[u8]) -> Result<OutPoint, Error> {
    if key.len() != 36 {
        return Err(Error::Storage(format!(
            "invalid outpoint key length {}",
            key.len()
        )));
    }
    let txid = Txid::from_slice(&key[..32])
        .map_err(|e| Error::Storage(format!("invalid outpoint key: {}", e)))?;
    let vout = u32::from_le_bytes(key[32..].try_into().expect("checked length"));
    Ok(OutPoint { txid, vout })
}

impl Storage for SledStorageProvider {
    fn save_opening_state(
        &self,
        funding_outpoint: &OutPoint,
        state: ChannelOpeningState,
        short_channel_id: ShortChannelId,
    ) -> Result<(), Error> {
        self.opening_state_tree()?
            .insert(
                outpoint_key(funding_outpoint),
                &serialize_opening_state(state, short_channel_id),
            )
            .map_err(|e| Error::Storage(format!("Error saving opening state: {}", e)))?;
        Ok(())
    }

    fn get_opening_state(
        &self,
        funding_outpoint: &OutPoint,
    ) -> Result<Option<(ChannelOpeningState, ShortChannelId)>, Error> {
        let value = self
            .opening_state_tree()?
            .get(outpoint_key(funding_outpoint))
            .map_err(|e| Error::Storage(format!("Error reading opening state: {}", e)))?;
        match value {
            Some(value) => Ok(Some(deserialize_opening_state(&value)?)),
            None => Ok(None),
        }
    }

    fn delete_opening_state(&self, funding_outpoint: &OutPoint) -> Result<(), Error> {
        self.opening_state_tree()?
            .remove(outpoint_key(funding_outpoint))
            .map_err(|e| Error::Storage(format!("Error deleting opening state: {}", e)))?;
        Ok(())
    }

    fn all_opening_states(
        &self,
    ) -> Result<Vec<(OutPoint, ChannelOpeningState, ShortChannelId)>, Error> {
        let tree = self.opening_state_tree()?;
        let mut res = Vec::new();
        for entry in tree.iter() {
            let (key, value) =
                entry.map_err(|e| Error::Storage(format!("Error iterating opening states: {}", e)))?;
            let funding_outpoint = deserialize_outpoint_key(&key)?;
            let (state, short_channel_id) = deserialize_opening_state(&value)?;
            res.push((funding_outpoint, state, short_channel_id));
        }
        Ok(res)
    }
}
