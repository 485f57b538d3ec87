//! The NEO governance token: committee election and GAS distribution.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use helios_config::ProtocolSettings;
use helios_core::UInt160;
use helios_crypto::ECPoint;
use helios_io::{BinaryWriter, MemoryReader, Serializable};
use helios_persistence::{DataCache, StorageKey};
use helios_vm::StackItem;

use crate::application_engine::ApplicationEngine;
use crate::contract::signature_address;
use crate::native::{
    arg, arg_hash, arg_i64, arg_optional, arg_pubkey, bool_item, gas, int_item, native_hash,
    require_committee, unknown_method, NativeContract, NativeMethod,
};
use crate::{Error, Result};

/// Contract id of the NEO native.
pub const ID: i32 = -5;

/// Fixed total supply; NEO is indivisible.
pub const TOTAL_SUPPLY: i64 = 100_000_000;

/// Default GAS generated per block, in datoshi.
pub const DEFAULT_GAS_PER_BLOCK: i64 = 5_0000_0000;

/// Default candidate registration burn: 1000 GAS.
pub const DEFAULT_REGISTER_PRICE: i64 = 1000_0000_0000;

/// Reward split, in percent.
const HOLDER_REWARD_RATIO: i64 = 10;
const COMMITTEE_REWARD_RATIO: i64 = 10;
const VOTER_REWARD_RATIO: i64 = 80;

/// Fixed-point factor for the per-vote reward accumulator.
const ACCUMULATOR_FACTOR: i64 = 100_000_000;

const PREFIX_BALANCE: u8 = 20;
const PREFIX_CANDIDATE: u8 = 33;
const PREFIX_VOTER_REWARD: u8 = 23;
const KEY_VOTERS_COUNT: u8 = 1;
const KEY_COMMITTEE: u8 = 14;
const KEY_GAS_PER_BLOCK: u8 = 29;
const KEY_REGISTER_PRICE: u8 = 13;

/// Per-account NEO state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NeoAccountState {
    /// NEO balance.
    pub balance: i64,
    /// Height at which GAS was last distributed to this account.
    pub balance_height: u32,
    /// The candidate this account votes for.
    pub vote_to: Option<ECPoint>,
    /// Voter-reward accumulator snapshot taken when the vote was cast.
    pub last_gas_per_vote: BigInt,
}

impl Serializable for NeoAccountState {
    fn size(&self) -> usize {
        8 + 4
            + 1
            + if self.vote_to.is_some() { 33 } else { 0 }
            + helios_io::serializable::var_bytes_size(
                StackItem::int_to_bytes(&self.last_gas_per_vote).len(),
            )
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_i64(self.balance)?;
        writer.write_u32(self.balance_height)?;
        match &self.vote_to {
            Some(key) => {
                writer.write_bool(true)?;
                writer.write_bytes(key.as_bytes())?;
            }
            None => writer.write_bool(false)?,
        }
        writer.write_var_bytes(&StackItem::int_to_bytes(&self.last_gas_per_vote))
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let balance = reader.read_i64()?;
        let balance_height = reader.read_u32()?;
        let vote_to = if reader.read_bool()? {
            let bytes = reader.read_bytes(33)?;
            Some(
                ECPoint::from_bytes(&bytes)
                    .map_err(|e| helios_io::Error::InvalidData(e.to_string()))?,
            )
        } else {
            None
        };
        let accumulator = reader.read_var_bytes(48)?;
        Ok(Self {
            balance,
            balance_height,
            vote_to,
            last_gas_per_vote: StackItem::bytes_to_int(&accumulator),
        })
    }
}

/// Per-candidate registration state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateState {
    /// Unregistered candidates keep their votes but are not electable.
    pub registered: bool,
    /// Total NEO voting for this candidate.
    pub votes: i64,
}

impl Serializable for CandidateState {
    fn size(&self) -> usize {
        1 + 8
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_bool(self.registered)?;
        writer.write_i64(self.votes)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        Ok(Self {
            registered: reader.read_bool()?,
            votes: reader.read_i64()?,
        })
    }
}

// ---- raw storage access ---------------------------------------------------

fn balance_key(account: &UInt160) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_BALANCE, account.as_bytes())
}

fn candidate_key(key: &ECPoint) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_CANDIDATE, key.as_bytes())
}

fn voter_reward_key(key: &ECPoint) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_VOTER_REWARD, key.as_bytes())
}

/// Reads an account state; absent accounts read as empty.
pub fn account_state(snapshot: &DataCache<'_>, account: &UInt160) -> NeoAccountState {
    snapshot
        .try_get(&balance_key(account))
        .and_then(|item| helios_io::from_bytes(&item.value).ok())
        .unwrap_or_default()
}

/// The NEO balance of an account.
pub fn balance_of(snapshot: &DataCache<'_>, account: &UInt160) -> i64 {
    account_state(snapshot, account).balance
}

fn candidate_state(snapshot: &DataCache<'_>, key: &ECPoint) -> CandidateState {
    snapshot
        .try_get(&candidate_key(key))
        .and_then(|item| helios_io::from_bytes(&item.value).ok())
        .unwrap_or_default()
}

fn voter_reward_accumulator(snapshot: &DataCache<'_>, key: &ECPoint) -> BigInt {
    snapshot
        .try_get(&voter_reward_key(key))
        .map(|item| StackItem::bytes_to_int(&item.value))
        .unwrap_or_else(BigInt::zero)
}

/// GAS generated per block, in datoshi.
pub fn gas_per_block(snapshot: &DataCache<'_>) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_GAS_PER_BLOCK))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(DEFAULT_GAS_PER_BLOCK)
}

/// Burn price of candidate registration, in datoshi.
pub fn register_price(snapshot: &DataCache<'_>) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_REGISTER_PRICE))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(DEFAULT_REGISTER_PRICE)
}

fn standby_keys(settings: &ProtocolSettings) -> Result<Vec<ECPoint>> {
    settings
        .standby_committee
        .iter()
        .map(|hex| ECPoint::from_hex(hex).map_err(Error::Crypto))
        .collect()
}

/// Candidates sorted for election: votes descending, key ascending.
fn sorted_candidates(snapshot: &DataCache<'_>) -> Vec<(ECPoint, i64)> {
    let mut candidates: Vec<(ECPoint, i64)> = snapshot
        .find(ID, &[PREFIX_CANDIDATE])
        .into_iter()
        .filter_map(|(key, item)| {
            let point = ECPoint::from_bytes(&key.key[1..]).ok()?;
            let state: CandidateState = helios_io::from_bytes(&item.value).ok()?;
            state.registered.then_some((point, state.votes))
        })
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    candidates
}

fn compute_committee(
    snapshot: &DataCache<'_>,
    settings: &ProtocolSettings,
) -> Result<Vec<(ECPoint, i64)>> {
    let mut committee = sorted_candidates(snapshot);
    committee.truncate(settings.committee_size);
    if committee.len() < settings.committee_size {
        for key in standby_keys(settings)? {
            if committee.len() >= settings.committee_size {
                break;
            }
            if !committee.iter().any(|(k, _)| *k == key) {
                committee.push((key, 0));
            }
        }
    }
    if committee.is_empty() {
        return Err(Error::Native("no committee can be formed".into()));
    }
    Ok(committee)
}

fn read_cached_committee(snapshot: &DataCache<'_>) -> Option<Vec<(ECPoint, i64)>> {
    let value = snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_COMMITTEE))?
        .value;
    let mut reader = MemoryReader::new(&value);
    let count = reader.read_var_int(1024).ok()? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let key_bytes = reader.read_bytes(33).ok()?;
        let key = ECPoint::from_bytes(&key_bytes).ok()?;
        let votes = reader.read_i64().ok()?;
        members.push((key, votes));
    }
    Some(members)
}

fn write_committee(
    engine: &mut ApplicationEngine<'_>,
    members: &[(ECPoint, i64)],
) -> Result<()> {
    let mut writer = BinaryWriter::new();
    writer.write_var_int(members.len() as u64)?;
    for (key, votes) in members {
        writer.write_bytes(key.as_bytes())?;
        writer.write_i64(*votes)?;
    }
    engine.storage_put(ID, &[KEY_COMMITTEE], writer.into_bytes())
}

/// The current committee with votes, cached or computed.
pub fn committee_members(
    snapshot: &DataCache<'_>,
    settings: &ProtocolSettings,
) -> Result<Vec<(ECPoint, i64)>> {
    match read_cached_committee(snapshot) {
        Some(members) if !members.is_empty() => Ok(members),
        _ => compute_committee(snapshot, settings),
    }
}

/// The current committee keys, sorted for multisig derivation.
pub fn committee_keys(
    snapshot: &DataCache<'_>,
    settings: &ProtocolSettings,
) -> Result<Vec<ECPoint>> {
    let mut keys: Vec<ECPoint> = committee_members(snapshot, settings)?
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    keys.sort();
    Ok(keys)
}

/// The validator set signing the next block: the top of the committee by
/// votes, sorted by key.
pub fn next_block_validators(
    snapshot: &DataCache<'_>,
    settings: &ProtocolSettings,
) -> Result<Vec<ECPoint>> {
    let members = committee_members(snapshot, settings)?;
    let mut validators: Vec<ECPoint> = members
        .into_iter()
        .take(settings.validators_count)
        .map(|(key, _)| key)
        .collect();
    validators.sort();
    Ok(validators)
}

/// GAS claimable by `account` up to block `end`.
pub fn unclaimed_gas(snapshot: &DataCache<'_>, account: &UInt160, end: u32) -> i64 {
    let state = account_state(snapshot, account);
    unclaimed_for_state(snapshot, &state, end)
}

fn unclaimed_for_state(snapshot: &DataCache<'_>, state: &NeoAccountState, end: u32) -> i64 {
    if state.balance <= 0 || end <= state.balance_height {
        return 0;
    }
    let blocks = (end - state.balance_height) as i128;
    let holder = state.balance as i128 * blocks * gas_per_block(snapshot) as i128
        * HOLDER_REWARD_RATIO as i128
        / 100
        / TOTAL_SUPPLY as i128;

    let voter = match &state.vote_to {
        Some(candidate) => {
            let latest = voter_reward_accumulator(snapshot, candidate);
            let delta = latest - &state.last_gas_per_vote;
            (BigInt::from(state.balance) * delta / ACCUMULATOR_FACTOR)
                .to_i128()
                .unwrap_or(0)
        }
        None => 0,
    };

    (holder + voter).try_into().unwrap_or(i64::MAX)
}

fn put_account(
    engine: &mut ApplicationEngine<'_>,
    account: &UInt160,
    state: &NeoAccountState,
) -> Result<()> {
    let key = [&[PREFIX_BALANCE][..], account.as_bytes()].concat();
    if state.balance == 0 && state.vote_to.is_none() {
        engine.storage_delete(ID, &key)
    } else {
        engine.storage_put(ID, &key, helios_io::to_bytes(state)?)
    }
}

fn put_candidate(
    engine: &mut ApplicationEngine<'_>,
    key: &ECPoint,
    state: &CandidateState,
) -> Result<()> {
    let storage_key = [&[PREFIX_CANDIDATE][..], key.as_bytes()].concat();
    if !state.registered && state.votes == 0 {
        engine.storage_delete(ID, &storage_key)
    } else {
        engine.storage_put(ID, &storage_key, helios_io::to_bytes(state)?)
    }
}

fn adjust_candidate_votes(
    engine: &mut ApplicationEngine<'_>,
    key: &ECPoint,
    delta: i64,
) -> Result<()> {
    let mut state = candidate_state(engine.snapshot(), key);
    state.votes += delta;
    put_candidate(engine, key, &state)
}

/// Mints pending GAS and refreshes the account's distribution marker.
fn distribute_gas(
    engine: &mut ApplicationEngine<'_>,
    account: &UInt160,
    state: &mut NeoAccountState,
) -> Result<()> {
    let end = engine.persisting_index();
    let pending = unclaimed_for_state(engine.snapshot(), state, end);
    state.balance_height = end;
    if let Some(candidate) = &state.vote_to {
        state.last_gas_per_vote = voter_reward_accumulator(engine.snapshot(), candidate);
    }
    if pending > 0 {
        gas::mint(engine, account, pending)?;
    }
    Ok(())
}

/// The NEO native contract.
pub struct NeoToken {
    hash: UInt160,
    methods: Vec<NativeMethod>,
}

impl NeoToken {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("NeoToken"),
            methods: vec![
                NativeMethod::safe("symbol", 0, 1),
                NativeMethod::safe("decimals", 0, 1),
                NativeMethod::safe("totalSupply", 0, 1 << 15),
                NativeMethod::safe("balanceOf", 1, 1 << 15),
                NativeMethod::safe("unclaimedGas", 2, 1 << 17),
                NativeMethod::unsafe_method("transfer", 4, 1 << 17),
                NativeMethod::unsafe_method("vote", 2, 1 << 16),
                NativeMethod::unsafe_method("registerCandidate", 1, 0),
                NativeMethod::unsafe_method("unregisterCandidate", 1, 1 << 16),
                NativeMethod::safe("getCandidates", 0, 1 << 22),
                NativeMethod::safe("getCommittee", 0, 1 << 16),
                NativeMethod::safe("getNextBlockValidators", 0, 1 << 16),
                NativeMethod::safe("getGasPerBlock", 0, 1 << 15),
                NativeMethod::unsafe_method("setGasPerBlock", 1, 1 << 15),
                NativeMethod::safe("getRegisterPrice", 0, 1 << 15),
                NativeMethod::unsafe_method("setRegisterPrice", 1, 1 << 15),
            ],
        }
    }

    fn transfer(
        &self,
        engine: &mut ApplicationEngine<'_>,
        from: UInt160,
        to: UInt160,
        amount: i64,
    ) -> Result<bool> {
        if amount < 0 {
            return Err(Error::Native("cannot transfer a negative amount".into()));
        }
        if !engine.check_witness(&from)? {
            return Ok(false);
        }
        let mut from_state = account_state(engine.snapshot(), &from);
        if from_state.balance < amount {
            return Ok(false);
        }
        distribute_gas(engine, &from, &mut from_state)?;
        if from == to {
            put_account(engine, &from, &from_state)?;
        } else {
            from_state.balance -= amount;
            if let Some(candidate) = from_state.vote_to {
                adjust_candidate_votes(engine, &candidate, -amount)?;
            }
            put_account(engine, &from, &from_state)?;

            let mut to_state = account_state(engine.snapshot(), &to);
            distribute_gas(engine, &to, &mut to_state)?;
            to_state.balance += amount;
            if let Some(candidate) = to_state.vote_to {
                adjust_candidate_votes(engine, &candidate, amount)?;
            }
            put_account(engine, &to, &to_state)?;
        }
        engine.notify(
            "Transfer".into(),
            vec![
                StackItem::from_bytes(from.to_vec()),
                StackItem::from_bytes(to.to_vec()),
                int_item(amount),
            ],
        )?;
        Ok(true)
    }

    fn vote(
        &self,
        engine: &mut ApplicationEngine<'_>,
        account: UInt160,
        candidate: Option<ECPoint>,
    ) -> Result<bool> {
        if !engine.check_witness(&account)? {
            return Ok(false);
        }
        let mut state = account_state(engine.snapshot(), &account);
        if state.balance == 0 && candidate.is_some() {
            return Ok(false);
        }
        if let Some(key) = &candidate {
            if !candidate_state(engine.snapshot(), key).registered {
                return Ok(false);
            }
        }
        distribute_gas(engine, &account, &mut state)?;
        if let Some(previous) = state.vote_to {
            adjust_candidate_votes(engine, &previous, -state.balance)?;
        }
        if let Some(next) = &candidate {
            adjust_candidate_votes(engine, next, state.balance)?;
            state.last_gas_per_vote = voter_reward_accumulator(engine.snapshot(), next);
        } else {
            state.last_gas_per_vote = BigInt::zero();
        }
        self.adjust_voters_count(
            engine,
            match (state.vote_to.is_some(), candidate.is_some()) {
                (false, true) => state.balance,
                (true, false) => -state.balance,
                _ => 0,
            },
        )?;
        state.vote_to = candidate;
        put_account(engine, &account, &state)?;
        engine.notify(
            "Vote".into(),
            vec![
                StackItem::from_bytes(account.to_vec()),
                match &state.vote_to {
                    Some(key) => StackItem::from_bytes(key.to_vec()),
                    None => StackItem::Null,
                },
            ],
        )?;
        Ok(true)
    }

    fn adjust_voters_count(&self, engine: &mut ApplicationEngine<'_>, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let current = engine
            .storage_get(ID, &[KEY_VOTERS_COUNT])
            .and_then(|v| v.try_into().ok().map(i64::from_le_bytes))
            .unwrap_or(0);
        engine.storage_put(
            ID,
            &[KEY_VOTERS_COUNT],
            (current + delta).to_le_bytes().to_vec(),
        )
    }

    fn register_candidate(
        &self,
        engine: &mut ApplicationEngine<'_>,
        key: ECPoint,
    ) -> Result<bool> {
        let owner = signature_address(&key);
        if !engine.check_witness(&owner)? {
            return Ok(false);
        }
        // The registration price is burned, not charged as execution gas.
        let price = register_price(engine.snapshot());
        gas::burn(engine, &owner, price)?;
        let mut state = candidate_state(engine.snapshot(), &key);
        if state.registered {
            return Ok(true);
        }
        state.registered = true;
        put_candidate(engine, &key, &state)?;
        Ok(true)
    }

    fn unregister_candidate(
        &self,
        engine: &mut ApplicationEngine<'_>,
        key: ECPoint,
    ) -> Result<bool> {
        let owner = signature_address(&key);
        if !engine.check_witness(&owner)? {
            return Ok(false);
        }
        let mut state = candidate_state(engine.snapshot(), &key);
        if !state.registered {
            return Ok(true);
        }
        state.registered = false;
        put_candidate(engine, &key, &state)?;
        Ok(true)
    }

    fn set_gas_per_block(&self, engine: &mut ApplicationEngine<'_>, value: i64) -> Result<()> {
        require_committee(engine)?;
        if !(0..=10 * helios_config::GAS_FACTOR).contains(&value) {
            return Err(Error::Native(format!("gas per block {value} out of range")));
        }
        engine.storage_put(ID, &[KEY_GAS_PER_BLOCK], value.to_le_bytes().to_vec())
    }

    fn set_register_price(&self, engine: &mut ApplicationEngine<'_>, value: i64) -> Result<()> {
        require_committee(engine)?;
        if value <= 0 {
            return Err(Error::Native("register price must be positive".into()));
        }
        engine.storage_put(ID, &[KEY_REGISTER_PRICE], value.to_le_bytes().to_vec())
    }
}

impl Default for NeoToken {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for NeoToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "NeoToken"
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
            "symbol" => Ok(StackItem::from_bytes(b"NEO".to_vec())),
            "decimals" => Ok(int_item(0)),
            "totalSupply" => Ok(int_item(TOTAL_SUPPLY)),
            "balanceOf" => Ok(int_item(balance_of(
                engine.snapshot(),
                &arg_hash(&args, 0)?,
            ))),
            "unclaimedGas" => {
                let account = arg_hash(&args, 0)?;
                let end = crate::native::arg_u32(&args, 1)?;
                Ok(int_item(unclaimed_gas(engine.snapshot(), &account, end)))
            }
            "transfer" => {
                let from = arg_hash(&args, 0)?;
                let to = arg_hash(&args, 1)?;
                let amount = arg_i64(&args, 2)?;
                let _data = arg(&args, 3)?;
                Ok(bool_item(self.transfer(engine, from, to, amount)?))
            }
            "vote" => {
                let account = arg_hash(&args, 0)?;
                let candidate = arg_optional(&args, 1)
                    .map(|item| {
                        let bytes = item.to_bytes().map_err(Error::Vm)?;
                        ECPoint::from_bytes(&bytes).map_err(Error::Crypto)
                    })
                    .transpose()?;
                Ok(bool_item(self.vote(engine, account, candidate)?))
            }
            "registerCandidate" => {
                let key = arg_pubkey(&args, 0)?;
                Ok(bool_item(self.register_candidate(engine, key)?))
            }
            "unregisterCandidate" => {
                let key = arg_pubkey(&args, 0)?;
                Ok(bool_item(self.unregister_candidate(engine, key)?))
            }
            "getCandidates" => {
                let candidates = sorted_candidates(engine.snapshot());
                Ok(StackItem::new_array(
                    candidates
                        .into_iter()
                        .map(|(key, votes)| {
                            StackItem::new_struct(vec![
                                StackItem::from_bytes(key.to_vec()),
                                int_item(votes),
                            ])
                        })
                        .collect(),
                ))
            }
            "getCommittee" => {
                let keys = committee_keys(engine.snapshot(), engine.settings())?;
                Ok(StackItem::new_array(
                    keys.into_iter()
                        .map(|key| StackItem::from_bytes(key.to_vec()))
                        .collect(),
                ))
            }
            "getNextBlockValidators" => {
                let keys = next_block_validators(engine.snapshot(), engine.settings())?;
                Ok(StackItem::new_array(
                    keys.into_iter()
                        .map(|key| StackItem::from_bytes(key.to_vec()))
                        .collect(),
                ))
            }
            "getGasPerBlock" => Ok(int_item(gas_per_block(engine.snapshot()))),
            "setGasPerBlock" => {
                self.set_gas_per_block(engine, arg_i64(&args, 0)?)?;
                Ok(StackItem::Null)
            }
            "getRegisterPrice" => Ok(int_item(register_price(engine.snapshot()))),
            "setRegisterPrice" => {
                self.set_register_price(engine, arg_i64(&args, 0)?)?;
                Ok(StackItem::Null)
            }
            other => Err(unknown_method("NeoToken", other)),
        }
    }

    fn initialize(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let committee = compute_committee(engine.snapshot(), engine.settings())?;
        write_committee(engine, &committee)?;
        let address = crate::contract::committee_address(
            &committee.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        )?;
        let state = NeoAccountState {
            balance: TOTAL_SUPPLY,
            balance_height: 0,
            vote_to: None,
            last_gas_per_vote: BigInt::zero(),
        };
        put_account(engine, &address, &state)?;
        engine.notify(
            "Transfer".into(),
            vec![
                StackItem::Null,
                StackItem::from_bytes(address.to_vec()),
                int_item(TOTAL_SUPPLY),
            ],
        )
    }

    fn on_persist(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let index = engine.persisting_index();
        let committee_size = engine.settings().committee_size as u32;
        if committee_size > 0 && index % committee_size == 0 {
            let committee = compute_committee(engine.snapshot(), engine.settings())?;
            write_committee(engine, &committee)?;
        }
        Ok(())
    }

    fn post_persist(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let index = engine.persisting_index();
        let members = committee_members(engine.snapshot(), engine.settings())?;
        if members.is_empty() {
            return Ok(());
        }
        let per_block = gas_per_block(engine.snapshot());

        // One committee member is paid directly each block, round-robin.
        let committee_reward = per_block * COMMITTEE_REWARD_RATIO / 100;
        let paid = &members[index as usize % members.len()];
        gas::mint(engine, &signature_address(&paid.0), committee_reward)?;

        // The voter share accrues on per-vote accumulators.
        let voter_reward = per_block * VOTER_REWARD_RATIO / 100 / members.len() as i64;
        for (key, votes) in &members {
            if *votes <= 0 {
                continue;
            }
            let increment = BigInt::from(voter_reward) * ACCUMULATOR_FACTOR / *votes;
            let updated = voter_reward_accumulator(engine.snapshot(), key) + increment;
            let key_bytes = [&[PREFIX_VOTER_REWARD][..], key.as_bytes()].concat();
            engine.storage_put(ID, &key_bytes, StackItem::int_to_bytes(&updated))?;
        }
        Ok(())
    }
}
