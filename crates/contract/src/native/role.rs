//! The RoleManagement native: designated node lists per role.

use helios_core::UInt160;
use helios_crypto::ECPoint;
use helios_io::{BinaryWriter, MemoryReader};
use helios_persistence::DataCache;
use helios_vm::StackItem;

use crate::application_engine::ApplicationEngine;
use crate::native::{
    arg, arg_u32, arg_u8, int_item, native_hash, require_committee, unknown_method,
    NativeContract, NativeMethod,
};
use crate::{Error, Result};

/// Contract id of the RoleManagement native.
pub const ID: i32 = -8;

/// Most nodes one designation may carry.
pub const MAX_NODES: usize = 32;

/// Node roles a committee can designate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Role {
    /// Signs state roots.
    StateValidator = 4,
    /// Runs the oracle service.
    Oracle = 8,
    /// Bridges NeoFS.
    NeoFSAlphabet = 16,
}

impl Role {
    /// Parses a role byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            4 => Some(Role::StateValidator),
            8 => Some(Role::Oracle),
            16 => Some(Role::NeoFSAlphabet),
            _ => None,
        }
    }
}

fn role_key(role: Role, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(role as u8);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn encode_nodes(nodes: &[ECPoint]) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    writer.write_var_int(nodes.len() as u64)?;
    for node in nodes {
        writer.write_bytes(node.as_bytes())?;
    }
    Ok(writer.into_bytes())
}

fn decode_nodes(bytes: &[u8]) -> Option<Vec<ECPoint>> {
    let mut reader = MemoryReader::new(bytes);
    let count = reader.read_var_int(MAX_NODES as u64).ok()? as usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let key_bytes = reader.read_bytes(33).ok()?;
        nodes.push(ECPoint::from_bytes(&key_bytes).ok()?);
    }
    Some(nodes)
}

/// The nodes designated for `role` as of block `index`: the most recent
/// designation at or before that height.
pub fn designates(snapshot: &DataCache<'_>, role: Role, index: u32) -> Vec<ECPoint> {
    snapshot
        .find(ID, &[role as u8])
        .into_iter()
        .filter(|(key, _)| {
            key.key.len() == 5
                && u32::from_be_bytes([key.key[1], key.key[2], key.key[3], key.key[4]]) <= index
        })
        .last()
        .and_then(|(_, item)| decode_nodes(&item.value))
        .unwrap_or_default()
}

/// The RoleManagement native contract.
pub struct RoleManagement {
    hash: UInt160,
    methods: Vec<NativeMethod>,
}

impl RoleManagement {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("RoleManagement"),
            methods: vec![
                NativeMethod::safe("getDesignatedByRole", 2, 1 << 15),
                NativeMethod::unsafe_method("designateAsRole", 2, 1 << 15),
            ],
        }
    }

    fn designate(
        &self,
        engine: &mut ApplicationEngine<'_>,
        role: Role,
        nodes: Vec<ECPoint>,
    ) -> Result<()> {
        if nodes.is_empty() || nodes.len() > MAX_NODES {
            return Err(Error::Native(format!(
                "designation of {} nodes is out of range",
                nodes.len()
            )));
        }
        require_committee(engine)?;
        let mut sorted = nodes;
        sorted.sort();
        sorted.dedup();
        // Effective from the next block, so the current one stays stable.
        let index = engine.persisting_index() + 1;
        let encoded = encode_nodes(&sorted)?;
        engine.storage_put(ID, &role_key(role, index), encoded)?;
        engine.notify(
            "Designation".into(),
            vec![int_item(role as u8 as i64), int_item(index as i64 - 1)],
        )?;
        Ok(())
    }
}

impl Default for RoleManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for RoleManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "RoleManagement"
    }

    fn hash(&self) -> UInt160 {
        self.hash
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine<'_>,
        method: &str,
        args: Vec<StackItem>,
    ) -> Result<StackItem> {
        match method {
            "getDesignatedByRole" => {
                let role = Role::from_byte(arg_u8(&args, 0)?)
                    .ok_or_else(|| Error::InvalidArgument("unknown role".into()))?;
                let index = arg_u32(&args, 1)?;
                let nodes = designates(engine.snapshot(), role, index);
                Ok(StackItem::new_array(
                    nodes
                        .into_iter()
                        .map(|node| StackItem::from_bytes(node.to_vec()))
                        .collect(),
                ))
            }
            "designateAsRole" => {
                let role = Role::from_byte(arg_u8(&args, 0)?)
                    .ok_or_else(|| Error::InvalidArgument("unknown role".into()))?;
                let nodes_item = arg(&args, 1)?;
                let StackItem::Array(items) = nodes_item else {
                    return Err(Error::InvalidArgument("nodes must be an array".into()));
                };
                let nodes = items
                    .borrow()
                    .iter()
                    .map(|item| {
                        let bytes = item.to_bytes().map_err(Error::Vm)?;
                        ECPoint::from_bytes(&bytes).map_err(Error::Crypto)
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.designate(engine, role, nodes)?;
                Ok(StackItem::Null)
            }
            other => Err(unknown_method("RoleManagement", other)),
        }
    }
}
