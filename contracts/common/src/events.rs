//! Pool Events
//!
//! Every successful operation records what it did to the pool. The log is
//! returned next to the unsigned transaction so indexers and UIs can show
//! the outcome before the transaction settles.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::orders::OrderKind;

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Pool lifecycle (0x01 - 0x0F)
    PoolCreated = 0x01,
    PoolDeleted = 0x02,
    PoolDelegated = 0x03,

    // Loans (0x10 - 0x1F)
    Borrowed = 0x10,
    LoanClosed = 0x11,
    Liquidated = 0x12,
    LeftoverClaimed = 0x13,

    // Liquidity (0x20 - 0x2F)
    LiquidityAdded = 0x20,
    LiquidityRemoved = 0x21,

    // Batcher orders (0x30 - 0x3F)
    OrderPlaced = 0x30,
    OrderCancelled = 0x31,
    OrderExecuted = 0x32,
}

/// All events a pool operation can record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolEvent {
    // ============ Pool Lifecycle ============

    PoolCreated {
        pool_nft_name: Vec<u8>,
        config_nft_name: Vec<u8>,
        initial_deposit: u64,
        timestamp_ms: i64,
    },

    PoolDeleted {
        pool_nft_name: Vec<u8>,
        lp_burned: u64,
        /// Whether the stake credential was deregistered too
        deregistered: bool,
        timestamp_ms: i64,
    },

    PoolDelegated {
        pool_nft_name: Vec<u8>,
        stake_pool_id: String,
        timestamp_ms: i64,
    },

    // ============ Loans ============

    Borrowed {
        pool_nft_name: Vec<u8>,
        borrower_token_name: Vec<u8>,
        loan_amount: u64,
        collateral_amount: u64,
        interest_rate: u64,
        timestamp_ms: i64,
    },

    /// Loan repaid, immediately or through a delayed merge
    LoanClosed {
        pool_nft_name: Vec<u8>,
        borrower_token_name: Vec<u8>,
        loan_amount: u64,
        interest: u64,
        platform_fee: u64,
        timestamp_ms: i64,
    },

    Liquidated {
        pool_nft_name: Vec<u8>,
        borrower_token_name: Vec<u8>,
        debt_value: u64,
        collateral_value: u64,
        liquidation_fee: u64,
        /// Collateral units left for the borrower (0 if none)
        leftover: u64,
        timestamp_ms: i64,
    },

    LeftoverClaimed {
        borrower_token_name: Vec<u8>,
        amount: u64,
        timestamp_ms: i64,
    },

    // ============ Liquidity ============

    LiquidityAdded {
        pool_nft_name: Vec<u8>,
        amount: u64,
        lp_minted: u64,
        timestamp_ms: i64,
    },

    LiquidityRemoved {
        pool_nft_name: Vec<u8>,
        amount: u64,
        lp_burned: u64,
        timestamp_ms: i64,
    },

    // ============ Orders ============

    OrderPlaced {
        pool_nft_name: Vec<u8>,
        kind: OrderKind,
        /// Deposit amount, LP burned, loan amount or repayment
        amount: u64,
        timestamp_ms: i64,
    },

    OrderCancelled {
        order: String,
        kind: OrderKind,
        timestamp_ms: i64,
    },

    OrderExecuted {
        pool_nft_name: Vec<u8>,
        order: String,
        kind: OrderKind,
        timestamp_ms: i64,
    },
}

impl PoolEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PoolCreated { .. } => EventType::PoolCreated,
            Self::PoolDeleted { .. } => EventType::PoolDeleted,
            Self::PoolDelegated { .. } => EventType::PoolDelegated,
            Self::Borrowed { .. } => EventType::Borrowed,
            Self::LoanClosed { .. } => EventType::LoanClosed,
            Self::Liquidated { .. } => EventType::Liquidated,
            Self::LeftoverClaimed { .. } => EventType::LeftoverClaimed,
            Self::LiquidityAdded { .. } => EventType::LiquidityAdded,
            Self::LiquidityRemoved { .. } => EventType::LiquidityRemoved,
            Self::OrderPlaced { .. } => EventType::OrderPlaced,
            Self::OrderCancelled { .. } => EventType::OrderCancelled,
            Self::OrderExecuted { .. } => EventType::OrderExecuted,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Self::PoolCreated { timestamp_ms, .. }
            | Self::PoolDeleted { timestamp_ms, .. }
            | Self::PoolDelegated { timestamp_ms, .. }
            | Self::Borrowed { timestamp_ms, .. }
            | Self::LoanClosed { timestamp_ms, .. }
            | Self::Liquidated { timestamp_ms, .. }
            | Self::LeftoverClaimed { timestamp_ms, .. }
            | Self::LiquidityAdded { timestamp_ms, .. }
            | Self::LiquidityRemoved { timestamp_ms, .. }
            | Self::OrderPlaced { timestamp_ms, .. }
            | Self::OrderCancelled { timestamp_ms, .. }
            | Self::OrderExecuted { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Serialize event to bytes for indexers
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Events collected while building one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<PoolEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<PoolEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&PoolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
