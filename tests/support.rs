//! Wire-encoding helpers shared by the scenario tests: builds the raw
//! `rollupProofData`/off-chain-payload byte layout `shielded_user_state::wire`
//! decodes, so these tests exercise the same path a real rollup provider
//! response would take.

pub const VIEWING_KEY_SIZE: usize = 80;

pub const PROOF_DEPOSIT: u32 = 0;
pub const PROOF_WITHDRAW: u32 = 1;
pub const PROOF_SEND: u32 = 2;
pub const PROOF_ACCOUNT: u32 = 3;
pub const PROOF_DEFI_DEPOSIT: u32 = 4;
pub const PROOF_DEFI_CLAIM: u32 = 5;

#[derive(Clone)]
pub struct RawInnerProof {
    pub proof_id: u32,
    pub note_commitment_1: [u8; 32],
    pub note_commitment_2: [u8; 32],
    pub nullifier_1: [u8; 32],
    pub nullifier_2: [u8; 32],
    pub public_value: u64,
    pub public_owner: [u8; 32],
    pub asset_id: u32,
    pub tx_id: [u8; 32],
}

impl RawInnerProof {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.proof_id.to_be_bytes());
        buf.extend_from_slice(&self.note_commitment_1);
        buf.extend_from_slice(&self.note_commitment_2);
        buf.extend_from_slice(&self.nullifier_1);
        buf.extend_from_slice(&self.nullifier_2);
        let mut public_value = [0u8; 32];
        public_value[24..].copy_from_slice(&self.public_value.to_be_bytes());
        buf.extend_from_slice(&public_value);
        buf.extend_from_slice(&self.public_owner);
        let mut asset_id = [0u8; 32];
        asset_id[28..].copy_from_slice(&self.asset_id.to_be_bytes());
        buf.extend_from_slice(&asset_id);
        buf.extend_from_slice(&self.tx_id);
        buf
    }
}

pub fn encode_rollup_proof_data(rollup_id: u32, data_start_index: u32, proofs: &[RawInnerProof]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&rollup_id.to_be_bytes());
    buf.extend_from_slice(&data_start_index.to_be_bytes());
    buf.extend_from_slice(&(proofs.len() as u32).to_be_bytes());
    for p in proofs {
        buf.extend_from_slice(&p.encode());
    }
    buf
}

pub fn encode_join_split_offchain(viewing_key_1: &[u8], viewing_key_2: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(viewing_key_1);
    buf.extend_from_slice(viewing_key_2);
    buf
}

pub fn encode_defi_deposit_offchain(
    viewing_key: &[u8],
    input_asset_id: u32,
    output_asset_id_a: u32,
    output_asset_id_b: u32,
    deposit_value: u64,
    partial_state_eph_pub_key: [u8; 32],
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(viewing_key);
    buf.extend_from_slice(&input_asset_id.to_be_bytes());
    buf.extend_from_slice(&output_asset_id_a.to_be_bytes());
    buf.extend_from_slice(&output_asset_id_b.to_be_bytes());
    let mut deposit_value_bytes = [0u8; 32];
    deposit_value_bytes[24..].copy_from_slice(&deposit_value.to_be_bytes());
    buf.extend_from_slice(&deposit_value_bytes);
    buf.extend_from_slice(&partial_state_eph_pub_key);
    buf
}

pub fn viewing_key(tag: u8) -> Vec<u8> {
    vec![tag; VIEWING_KEY_SIZE]
}
