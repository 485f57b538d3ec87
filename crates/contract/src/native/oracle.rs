//! The Oracle native: the on-chain request registry and response handling.

use helios_core::{TransactionAttribute, UInt160, UInt256};
use helios_io::{BinaryWriter, MemoryReader, Serializable};
use helios_persistence::{DataCache, StorageKey};
use helios_vm::{CallFlags, StackItem};

use crate::application_engine::{ApplicationEngine, ScriptContainer, TriggerType};
use crate::native::{
    arg, arg_i64, arg_optional_string, arg_string, bool_item, gas, int_item, native_hash,
    require_committee, role, unknown_method, NativeContract, NativeMethod,
};
use crate::{Error, Result};

/// Contract id of the Oracle native.
pub const ID: i32 = -9;

/// Default price charged per request, in datoshi (0.5 GAS).
pub const DEFAULT_REQUEST_PRICE: i64 = 5000_0000;

/// Lower bound on the gas a requester attaches for its callback.
pub const MIN_RESPONSE_GAS: i64 = 1000_0000;

/// Longest accepted request URL.
pub const MAX_URL_LENGTH: usize = 256;
/// Longest accepted filter expression.
pub const MAX_FILTER_LENGTH: usize = 128;
/// Longest accepted callback method name.
pub const MAX_CALLBACK_LENGTH: usize = 32;
/// Largest user data payload.
pub const MAX_USER_DATA_LENGTH: usize = 512;

const KEY_PRICE: u8 = 5;
const KEY_REQUEST_ID: u8 = 9;
const PREFIX_REQUEST: u8 = 7;

/// A pending oracle request as stored on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    /// Hash of the transaction that created the request.
    pub original_tx_id: UInt256,
    /// GAS reserved for the response callback.
    pub gas_for_response: i64,
    /// The URL to fetch.
    pub url: String,
    /// Optional JSONPath filter applied to the response body.
    pub filter: Option<String>,
    /// Contract to call back.
    pub callback_contract: UInt160,
    /// Method to call back.
    pub callback_method: String,
    /// Opaque requester data echoed into the callback.
    pub user_data: Vec<u8>,
}

impl Serializable for OracleRequest {
    fn size(&self) -> usize {
        use helios_io::serializable::var_bytes_size;
        UInt256::SIZE
            + 8
            + var_bytes_size(self.url.len())
            + var_bytes_size(self.filter.as_deref().map(str::len).unwrap_or(0))
            + 1
            + UInt160::SIZE
            + var_bytes_size(self.callback_method.len())
            + var_bytes_size(self.user_data.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_serializable(&self.original_tx_id)?;
        writer.write_i64(self.gas_for_response)?;
        writer.write_var_string(&self.url)?;
        match &self.filter {
            Some(filter) => {
                writer.write_bool(true)?;
                writer.write_var_string(filter)?;
            }
            None => writer.write_bool(false)?,
        }
        writer.write_serializable(&self.callback_contract)?;
        writer.write_var_string(&self.callback_method)?;
        writer.write_var_bytes(&self.user_data)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let original_tx_id = reader.read_serializable()?;
        let gas_for_response = reader.read_i64()?;
        let url = reader.read_var_string(MAX_URL_LENGTH)?;
        let filter = if reader.read_bool()? {
            Some(reader.read_var_string(MAX_FILTER_LENGTH)?)
        } else {
            None
        };
        let callback_contract = reader.read_serializable()?;
        let callback_method = reader.read_var_string(MAX_CALLBACK_LENGTH)?;
        let user_data = reader.read_var_bytes(MAX_USER_DATA_LENGTH)?;
        Ok(Self {
            original_tx_id,
            gas_for_response,
            url,
            filter,
            callback_contract,
            callback_method,
            user_data,
        })
    }
}

fn request_key(id: u64) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_REQUEST, &id.to_be_bytes())
}

/// The price charged per oracle request.
pub fn request_price(snapshot: &DataCache<'_>) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_PRICE))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(DEFAULT_REQUEST_PRICE)
}

/// Reads one pending request.
pub fn get_request(snapshot: &DataCache<'_>, id: u64) -> Option<OracleRequest> {
    snapshot
        .try_get(&request_key(id))
        .and_then(|item| helios_io::from_bytes(&item.value).ok())
}

/// All pending requests in id order.
pub fn pending_requests(snapshot: &DataCache<'_>) -> Vec<(u64, OracleRequest)> {
    snapshot
        .find(ID, &[PREFIX_REQUEST])
        .into_iter()
        .filter_map(|(key, item)| {
            if key.key.len() != 9 {
                return None;
            }
            let mut id_bytes = [0u8; 8];
            id_bytes.copy_from_slice(&key.key[1..]);
            let request = helios_io::from_bytes(&item.value).ok()?;
            Some((u64::from_be_bytes(id_bytes), request))
        })
        .collect()
}

/// The Oracle native contract.
pub struct OracleContract {
    hash: UInt160,
    methods: Vec<NativeMethod>,
}

impl OracleContract {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("OracleContract"),
            methods: vec![
                NativeMethod::safe("getPrice", 0, 1 << 15),
                NativeMethod::unsafe_method("setPrice", 1, 1 << 15),
                NativeMethod {
                    name: "request",
                    params: 5,
                    price: 0,
                    required_flags: CallFlags::STATES | CallFlags::ALLOW_NOTIFY,
                    safe: false,
                },
                NativeMethod {
                    name: "finish",
                    params: 0,
                    price: 0,
                    required_flags: CallFlags::STATES
                        .union(CallFlags::ALLOW_CALL)
                        .union(CallFlags::ALLOW_NOTIFY),
                    safe: false,
                },
                NativeMethod::safe("verify", 0, 1 << 15),
            ],
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn request(
        &self,
        engine: &mut ApplicationEngine<'_>,
        url: String,
        filter: Option<String>,
        callback_method: String,
        user_data: Vec<u8>,
        gas_for_response: i64,
    ) -> Result<()> {
        if engine.trigger() != TriggerType::Application {
            return Err(Error::Native("oracle request outside Application".into()));
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(Error::Native(format!("URL of {} bytes too long", url.len())));
        }
        if let Some(filter) = &filter {
            if filter.len() > MAX_FILTER_LENGTH {
                return Err(Error::Native("filter too long".into()));
            }
        }
        if callback_method.len() > MAX_CALLBACK_LENGTH {
            return Err(Error::Native("callback method name too long".into()));
        }
        if callback_method.starts_with('_') {
            return Err(Error::Native(
                "callback cannot be a reserved method".into(),
            ));
        }
        if user_data.len() > MAX_USER_DATA_LENGTH {
            return Err(Error::Native("user data too large".into()));
        }
        if gas_for_response < MIN_RESPONSE_GAS {
            return Err(Error::Native(format!(
                "response gas {gas_for_response} below the minimum"
            )));
        }
        let callback_contract = engine
            .calling_script_hash()
            .ok_or_else(|| Error::Native("oracle request must come from a contract".into()))?;
        let original_tx_id = match engine.container() {
            Some(ScriptContainer::Transaction(tx)) => tx.hash(),
            _ => return Err(Error::Native("oracle request outside a transaction".into())),
        };

        engine.add_gas(request_price(engine.snapshot()))?;
        engine.add_gas(gas_for_response)?;

        let id = self.next_request_id(engine)?;
        let request = OracleRequest {
            original_tx_id,
            gas_for_response,
            url: url.clone(),
            filter: filter.clone(),
            callback_contract,
            callback_method,
            user_data,
        };
        engine
            .snapshot_mut()
            .put(request_key(id), helios_persistence::StorageItem::new(helios_io::to_bytes(&request)?))?;

        engine.notify(
            "OracleRequest".into(),
            vec![
                int_item(id as i64),
                StackItem::from_bytes(callback_contract.to_vec()),
                StackItem::from_bytes(url.into_bytes()),
                match filter {
                    Some(filter) => StackItem::from_bytes(filter.into_bytes()),
                    None => StackItem::Null,
                },
            ],
        )
    }

    fn next_request_id(&self, engine: &mut ApplicationEngine<'_>) -> Result<u64> {
        let current = engine
            .storage_get(ID, &[KEY_REQUEST_ID])
            .and_then(|v| v.try_into().ok().map(u64::from_le_bytes))
            .unwrap_or(0);
        engine.storage_put(ID, &[KEY_REQUEST_ID], (current + 1).to_le_bytes().to_vec())?;
        Ok(current)
    }

    fn finish(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let Some(ScriptContainer::Transaction(tx)) = engine.container().cloned() else {
            return Err(Error::Native("finish outside a transaction".into()));
        };
        let Some(TransactionAttribute::OracleResponse { id, code, result }) =
            tx.oracle_response().cloned()
        else {
            return Err(Error::Native(
                "finish requires an oracle response attribute".into(),
            ));
        };
        let request = get_request(engine.snapshot(), id)
            .ok_or_else(|| Error::Native(format!("oracle request {id} not found")))?;

        engine.notify(
            "OracleResponse".into(),
            vec![
                int_item(id as i64),
                StackItem::from_bytes(request.original_tx_id.to_vec()),
            ],
        )?;

        let args = vec![
            StackItem::from_bytes(request.url.clone().into_bytes()),
            StackItem::from_bytes(request.user_data.clone()),
            int_item(code as u8 as i64),
            StackItem::from_bytes(result),
        ];
        engine.call_contract(
            request.callback_contract,
            &request.callback_method,
            args,
            CallFlags::ALL,
            false,
        )
    }

    fn set_price(&self, engine: &mut ApplicationEngine<'_>, value: i64) -> Result<()> {
        require_committee(engine)?;
        if value <= 0 {
            return Err(Error::Native("oracle price must be positive".into()));
        }
        engine.storage_put(ID, &[KEY_PRICE], value.to_le_bytes().to_vec())
    }

    /// True when the container is a well-formed oracle response transaction;
    /// backs the witness of the oracle multisig account.
    fn verify(&self, engine: &ApplicationEngine<'_>) -> bool {
        matches!(
            engine
                .container()
                .and_then(|c| c.as_transaction())
                .and_then(|tx| tx.oracle_response()),
            Some(TransactionAttribute::OracleResponse { .. })
        )
    }
}

impl Default for OracleContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for OracleContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "OracleContract"
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
            "getPrice" => Ok(int_item(request_price(engine.snapshot()))),
            "setPrice" => {
                self.set_price(engine, arg_i64(&args, 0)?)?;
                Ok(StackItem::Null)
            }
            "request" => {
                let url = arg_string(&args, 0)?;
                let filter = arg_optional_string(&args, 1)?;
                let callback = arg_string(&args, 2)?;
                let user_data = arg(&args, 3)?.to_bytes().unwrap_or_default();
                let gas_for_response = arg_i64(&args, 4)?;
                self.request(engine, url, filter, callback, user_data, gas_for_response)?;
                Ok(StackItem::Null)
            }
            "finish" => {
                self.finish(engine)?;
                Ok(StackItem::Null)
            }
            "verify" => Ok(bool_item(self.verify(engine))),
            other => Err(unknown_method("OracleContract", other)),
        }
    }

    fn post_persist(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        let oracle_nodes = role::designates(
            engine.snapshot(),
            role::Role::Oracle,
            engine.persisting_index(),
        );
        for tx in &block.transactions {
            let Some(TransactionAttribute::OracleResponse { id, .. }) =
                tx.oracle_response().cloned()
            else {
                continue;
            };
            // The request is consumed by its response.
            if get_request(engine.snapshot(), id).is_none() {
                continue;
            }
            let price = request_price(engine.snapshot());
            engine.snapshot_mut().delete(request_key(id))?;
            if !oracle_nodes.is_empty() {
                let paid = oracle_nodes[id as usize % oracle_nodes.len()];
                let address = crate::contract::signature_address(&paid);
                gas::mint(engine, &address, price)?;
            }
        }
        Ok(())
    }
}
