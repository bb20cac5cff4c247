//! Generation settings shared across crates.
//!
//! Existence of a value is the proof of its validity: a [`TokenCap`] is always
//! inside the supported range and [`SamplingParams`] are already resolved from
//! config defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("token cap {value} is outside {min}..={max}", min = TokenCap::MIN, max = TokenCap::MAX)]
pub struct TokenCapError {
    pub value: u32,
}

/// Upper bound on generated tokens (decode steps) for one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TokenCap(u32);

impl TokenCap {
    pub const MIN: u32 = 99;
    pub const MAX: u32 = 32_000;
    pub const DEFAULT: u32 = 2048;
    /// Increment used by the UI's step controls.
    pub const STEP: u32 = 100;

    pub fn new(value: u32) -> Result<Self, TokenCapError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TokenCapError { value })
        }
    }

    /// Clamp an arbitrary value into range instead of rejecting it.
    #[must_use]
    pub fn saturating(value: u32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub fn step_up(self) -> Self {
        Self::saturating(self.0.saturating_add(Self::STEP))
    }

    #[must_use]
    pub fn step_down(self) -> Self {
        Self::saturating(self.0.saturating_sub(Self::STEP))
    }
}

impl Default for TokenCap {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u32> for TokenCap {
    type Error = TokenCapError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TokenCap> for u32 {
    fn from(value: TokenCap) -> Self {
        value.0
    }
}

impl std::fmt::Display for TokenCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters handed opaquely to the sampler.
///
/// The sampler owns the meaning of these values; Parlor only carries them from
/// config to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub min_p: f64,
    pub seed: u64,
}

impl SamplingParams {
    pub const DEFAULT_SEED: u64 = 299_792_458;

    #[must_use]
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.95,
            top_k: 20,
            min_p: 0.0,
            seed: Self::DEFAULT_SEED,
        }
    }
}
