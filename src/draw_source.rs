//! Verifiable random draw source
//!
//! Each draw request is answered by signing `round:slot:token` with a
//! schnorrkel keypair. The SHA-256 of the signature is the VRF output, and the
//! drawn number is taken from it by rejection sampling so every value in
//! 1..=39 is equally likely. Anyone holding the public key can re-derive the
//! number from a [`DrawProof`].

use crate::common::traits::{DrawSourceError, RandomDrawSource};
use crate::lottery::{DrawRequest, MAX_NUMBER};
use async_trait::async_trait;
use dashmap::DashMap;
use schnorrkel::context::SigningContext;
use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const DRAW_SIGNING_CONTEXT: &[u8] = b"lotto-draw";

/// Largest multiple of 39 that fits in a byte; bytes at or above it are skipped
const SAMPLE_LIMIT: u8 = (u8::MAX / MAX_NUMBER) * MAX_NUMBER;

/// Bounds the rehash loop; 32 rejected bytes in a row is already vanishingly rare
const MAX_REHASH: usize = 8;

/// Everything needed to check a drawn number after the fact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawProof {
    pub round: u64,
    pub slot: usize,
    pub token: Uuid,
    pub value: u8,
    pub vrf_output: String,
    pub vrf_proof: String,
    pub public_key: String,
    pub input_message: String,
}

pub struct VrfDrawSource {
    keypair: Arc<Keypair>,
    proofs: DashMap<Uuid, DrawProof>,
}

impl VrfDrawSource {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            proofs: DashMap::new(),
        }
    }

    /// Random keypair (for testing)
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Deterministic keypair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, DrawSourceError> {
        let mini = MiniSecretKey::from_bytes(seed)
            .map_err(|e| DrawSourceError::ProofFailed(format!("Invalid seed: {:?}", e)))?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519)))
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }

    /// Proof recorded for a previously answered request
    pub fn proof(&self, token: &Uuid) -> Option<DrawProof> {
        self.proofs.get(token).map(|entry| entry.value().clone())
    }

    /// All proofs for one round, in slot order
    pub fn proofs_for_round(&self, round: u64) -> Vec<DrawProof> {
        let mut proofs: Vec<DrawProof> = self
            .proofs
            .iter()
            .filter(|entry| entry.value().round == round)
            .map(|entry| entry.value().clone())
            .collect();
        proofs.sort_by_key(|p| (p.slot, p.token));
        proofs
    }

    /// Forget proofs of every round before `round`. Returns how many were dropped.
    pub fn prune_before(&self, round: u64) -> usize {
        let before = self.proofs.len();
        self.proofs.retain(|_, proof| proof.round >= round);
        before - self.proofs.len()
    }

    pub fn proof_count(&self) -> usize {
        self.proofs.len()
    }

    /// Sign the request and derive its number
    pub fn prove(&self, request: &DrawRequest) -> Result<DrawProof, DrawSourceError> {
        let input_message = input_message(request.round, request.slot, &request.token);

        let ctx = SigningContext::new(DRAW_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(input_message.as_bytes()));
        let signature_bytes = signature.to_bytes();
        let vrf_output = Sha256::digest(signature_bytes).to_vec();
        let value = number_from_output(&vrf_output);

        Ok(DrawProof {
            round: request.round,
            slot: request.slot,
            token: request.token,
            value,
            vrf_output: hex::encode(&vrf_output),
            vrf_proof: hex::encode(signature_bytes),
            public_key: self.public_key_hex(),
            input_message,
        })
    }
}

#[async_trait]
impl RandomDrawSource for VrfDrawSource {
    async fn draw_number(&self, request: &DrawRequest) -> Result<u8, DrawSourceError> {
        let proof = self.prove(request)?;
        let value = proof.value;
        debug!(round = request.round, slot = request.slot, token = %request.token, value, "VRF draw produced");
        self.proofs.insert(request.token, proof);
        Ok(value)
    }

    /// Keeps the proofs of the round just finished, drops anything older
    fn round_started(&self, round: u64) {
        let pruned = self.prune_before(round.saturating_sub(1));
        if pruned > 0 {
            debug!(round, pruned, "Pruned old draw proofs");
        }
    }
}

fn input_message(round: u64, slot: usize, token: &Uuid) -> String {
    format!("{}:{}:{}", round, slot, token)
}

/// Map a VRF output onto 1..=39 without modulo bias
pub fn number_from_output(output: &[u8]) -> u8 {
    let mut block = output.to_vec();
    for _ in 0..MAX_REHASH {
        if let Some(byte) = block.iter().copied().find(|b| *b < SAMPLE_LIMIT) {
            return byte % MAX_NUMBER + 1;
        }
        block = Sha256::digest(&block).to_vec();
    }
    block.first().copied().unwrap_or(0) % MAX_NUMBER + 1
}

/// Check a proof against its public key. `Ok(false)` means the proof does not hold.
pub fn verify_draw_proof(proof: &DrawProof) -> Result<bool, DrawSourceError> {
    if proof.input_message != input_message(proof.round, proof.slot, &proof.token) {
        return Ok(false);
    }

    let vrf_output = hex::decode(&proof.vrf_output)
        .map_err(|e| DrawSourceError::ProofFailed(format!("Invalid VRF output hex: {}", e)))?;
    let signature_bytes = hex::decode(&proof.vrf_proof)
        .map_err(|e| DrawSourceError::ProofFailed(format!("Invalid VRF proof hex: {}", e)))?;
    let public_key_bytes = hex::decode(&proof.public_key)
        .map_err(|e| DrawSourceError::ProofFailed(format!("Invalid public key hex: {}", e)))?;

    let public_key = PublicKey::from_bytes(&public_key_bytes)
        .map_err(|e| DrawSourceError::ProofFailed(format!("Invalid public key: {:?}", e)))?;
    let signature = Signature::from_bytes(&signature_bytes)
        .map_err(|e| DrawSourceError::ProofFailed(format!("Invalid signature: {:?}", e)))?;

    let ctx = SigningContext::new(DRAW_SIGNING_CONTEXT);
    if public_key
        .verify(ctx.bytes(proof.input_message.as_bytes()), &signature)
        .is_err()
    {
        return Ok(false);
    }

    let computed_output = Sha256::digest(&signature_bytes);
    if computed_output.as_slice() != vrf_output.as_slice() {
        return Ok(false);
    }

    Ok(number_from_output(&vrf_output) == proof.value)
}
