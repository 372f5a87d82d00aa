//! Redeemer Schemas
//!
//! Every redeemer the assembled transactions attach. Output indices
//! inside redeemers point into the plan's ordered output list.

use crate::plutus::{PlutusData, ToPlutusData};
use crate::types::OutputReference;

// ============ Pool Validator ============

/// State transition applied to a continuing pool output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuingAction {
    /// Deposit (`value_delta > 0`) or withdrawal (`value_delta < 0`)
    LpAdjust {
        value_delta: i64,
        continuing_output: u64,
    },
    Borrow {
        loan_amount: u64,
        collateral_amount: u64,
        borrower_token_name: Vec<u8>,
        interest_rate: u64,
        continuing_output: u64,
    },
    CloseLoan {
        loan_amount: u64,
        repay_amount: u64,
        continuing_output: u64,
    },
}

impl ToPlutusData for ContinuingAction {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            ContinuingAction::LpAdjust {
                value_delta,
                continuing_output,
            } => PlutusData::constr(
                0,
                vec![PlutusData::int(*value_delta), PlutusData::int(*continuing_output)],
            ),
            ContinuingAction::Borrow {
                loan_amount,
                collateral_amount,
                borrower_token_name,
                interest_rate,
                continuing_output,
            } => PlutusData::constr(
                1,
                vec![
                    PlutusData::int(*loan_amount),
                    PlutusData::int(*collateral_amount),
                    PlutusData::bytes(borrower_token_name),
                    PlutusData::int(*interest_rate),
                    PlutusData::int(*continuing_output),
                ],
            ),
            ContinuingAction::CloseLoan {
                loan_amount,
                repay_amount,
                continuing_output,
            } => PlutusData::constr(
                2,
                vec![
                    PlutusData::int(*loan_amount),
                    PlutusData::int(*repay_amount),
                    PlutusData::int(*continuing_output),
                ],
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolAction {
    Continuing(ContinuingAction),
    Destroy,
}

/// Redeemer spending the pool output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRedeemer {
    pub action: PoolAction,
    /// Output holding the pool config datum
    pub config_ref: OutputReference,
    /// Batcher order being executed, if any
    pub order: Option<OutputReference>,
}

impl ToPlutusData for PoolRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        let action = match &self.action {
            PoolAction::Continuing(inner) => PlutusData::constr(0, vec![inner.to_plutus_data()]),
            PoolAction::Destroy => PlutusData::unit(1),
        };
        PlutusData::constr(
            0,
            vec![
                action,
                self.config_ref.to_plutus_data(),
                self.order.to_plutus_data(),
            ],
        )
    }
}

// ============ Collateral Validator ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollateralAction {
    Repay,
    /// Liquidation, carrying the leftover output index
    Liquidate(u64),
}

/// How the repaid loan reaches the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeType {
    /// The pool output is spent in the same transaction
    ImmediateWithPool(OutputReference),
    /// Funds go to the delayed-merge address for a batcher to fold in
    DelayedIntoPool {
        output_index: u64,
        amount_repaying: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollateralRedeemer {
    pub action: CollateralAction,
    pub interest: u64,
    pub merge_type: MergeType,
}

impl ToPlutusData for CollateralRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        let action = match self.action {
            CollateralAction::Repay => PlutusData::unit(0),
            CollateralAction::Liquidate(leftover_output) => {
                PlutusData::constr(1, vec![PlutusData::int(leftover_output)])
            }
        };
        let merge_type = match &self.merge_type {
            MergeType::ImmediateWithPool(pool_oref) => {
                PlutusData::constr(0, vec![pool_oref.to_plutus_data()])
            }
            MergeType::DelayedIntoPool {
                output_index,
                amount_repaying,
            } => PlutusData::constr(
                1,
                vec![PlutusData::constr(
                    0,
                    vec![PlutusData::int(*output_index), PlutusData::int(*amount_repaying)],
                )],
            ),
        };
        PlutusData::constr(0, vec![action, PlutusData::int(self.interest), merge_type])
    }
}

/// Borrower NFT mint/burn under the collateral policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollateralMint {
    /// (consumed pool output, index of the new collateral output)
    pub mints: Vec<(OutputReference, u64)>,
    /// Borrower token names to burn
    pub burns: Vec<Vec<u8>>,
}

impl CollateralMint {
    pub fn mint(pool_oref: OutputReference, output_pointer: u64) -> Self {
        Self {
            mints: vec![(pool_oref, output_pointer)],
            burns: Vec::new(),
        }
    }

    pub fn burn(borrower_token_name: Vec<u8>) -> Self {
        Self {
            mints: Vec::new(),
            burns: vec![borrower_token_name],
        }
    }
}

impl ToPlutusData for CollateralMint {
    fn to_plutus_data(&self) -> PlutusData {
        let mints = self
            .mints
            .iter()
            .map(|(oref, pointer)| {
                PlutusData::constr(0, vec![oref.to_plutus_data(), PlutusData::int(*pointer)])
            })
            .collect();
        let burns = self
            .burns
            .iter()
            .map(|name| PlutusData::constr(0, vec![PlutusData::bytes(name)]))
            .collect();
        PlutusData::constr(0, vec![PlutusData::List(mints), PlutusData::List(burns)])
    }
}

// ============ Minting Policies ============

/// LP token policy redeemer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LpTokenRedeemer {
    TransitionPool {
        pool_oref: OutputReference,
        continuing_output: u64,
    },
    CreatePool {
        produced_output: u64,
    },
    DestroyPool {
        pool_oref: OutputReference,
    },
}

impl ToPlutusData for LpTokenRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            LpTokenRedeemer::TransitionPool {
                pool_oref,
                continuing_output,
            } => PlutusData::constr(
                0,
                vec![pool_oref.to_plutus_data(), PlutusData::int(*continuing_output)],
            ),
            LpTokenRedeemer::CreatePool { produced_output } => {
                PlutusData::constr(1, vec![PlutusData::int(*produced_output)])
            }
            LpTokenRedeemer::DestroyPool { pool_oref } => {
                PlutusData::constr(2, vec![pool_oref.to_plutus_data()])
            }
        }
    }
}

/// Pool NFT policy redeemer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolNftRedeemer {
    Mint {
        output_index: u64,
        initial_pool_delegation: Vec<u8>,
    },
    Burn {
        pool_nft_name: Vec<u8>,
    },
}

impl ToPlutusData for PoolNftRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            PoolNftRedeemer::Mint {
                output_index,
                initial_pool_delegation,
            } => PlutusData::constr(
                0,
                vec![PlutusData::constr(
                    0,
                    vec![
                        PlutusData::int(*output_index),
                        PlutusData::bytes(initial_pool_delegation),
                    ],
                )],
            ),
            PoolNftRedeemer::Burn { pool_nft_name } => {
                PlutusData::constr(1, vec![PlutusData::bytes(pool_nft_name)])
            }
        }
    }
}

/// One-shot NFT policy redeemer (pool config and delegator NFTs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NftRedeemer {
    Mint {
        seed: OutputReference,
        output_index: u64,
    },
    Burn {
        token_name: Vec<u8>,
    },
}

impl ToPlutusData for NftRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        let action = match self {
            NftRedeemer::Mint { seed, output_index } => {
                PlutusData::constr(0, vec![seed.to_plutus_data(), PlutusData::int(*output_index)])
            }
            NftRedeemer::Burn { token_name } => {
                PlutusData::constr(1, vec![PlutusData::bytes(token_name)])
            }
        };
        PlutusData::constr(0, vec![action, None::<PlutusData>.to_plutus_data()])
    }
}

/// Pool stake validator redeemer (registration, delegation)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakeRedeemer {
    CreatePool(OutputReference),
    Publish { pool_owner_oref: OutputReference },
}

impl ToPlutusData for StakeRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            StakeRedeemer::CreatePool(seed) => PlutusData::constr(0, vec![seed.to_plutus_data()]),
            StakeRedeemer::Publish { pool_owner_oref } => PlutusData::constr(
                1,
                vec![PlutusData::constr(0, vec![pool_owner_oref.to_plutus_data()])],
            ),
        }
    }
}

// ============ Orders ============

/// Borrow-specific data passed when a batcher processes a borrow order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowProcessData {
    pub borrower_token_name: Vec<u8>,
    pub additional_ada: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRedeemer {
    Process {
        pool_oref: OutputReference,
        additional_data: Option<BorrowProcessData>,
    },
    Cancel,
}

impl ToPlutusData for OrderRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            OrderRedeemer::Process {
                pool_oref,
                additional_data,
            } => {
                let additional = match additional_data {
                    Some(data) => Some(PlutusData::constr(
                        0,
                        vec![
                            PlutusData::bytes(&data.borrower_token_name),
                            PlutusData::int(data.additional_ada),
                        ],
                    )),
                    None => None,
                };
                PlutusData::constr(0, vec![pool_oref.to_plutus_data(), additional.to_plutus_data()])
            }
            OrderRedeemer::Cancel => PlutusData::unit(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oref() -> OutputReference {
        OutputReference::new(vec![0xab; 32], 1)
    }

    #[test]
    fn test_pool_redeemer_layout() {
        let redeemer = PoolRedeemer {
            action: PoolAction::Continuing(ContinuingAction::LpAdjust {
                value_delta: -5,
                continuing_output: 0,
            }),
            config_ref: oref(),
            order: None,
        };
        let data = redeemer.to_plutus_data();
        let fields = data.fields(0, 3, "pool redeemer").unwrap();
        let inner = fields[0].fields(0, 1, "continuing").unwrap();
        let adjust = inner[0].fields(0, 2, "lp adjust").unwrap();
        assert_eq!(adjust[0].as_int().unwrap(), -5);
        assert_eq!(fields[2], PlutusData::unit(1));

        let destroy = PoolRedeemer {
            action: PoolAction::Destroy,
            config_ref: oref(),
            order: Some(oref()),
        };
        let data = destroy.to_plutus_data();
        let fields = data.fields(0, 3, "pool redeemer").unwrap();
        assert_eq!(fields[0], PlutusData::unit(1));
        assert_eq!(fields[2].as_variant().unwrap().0, 0);
    }

    #[test]
    fn test_borrow_action_field_order() {
        let action = ContinuingAction::Borrow {
            loan_amount: 10,
            collateral_amount: 20,
            borrower_token_name: vec![1, 2],
            interest_rate: 30,
            continuing_output: 0,
        };
        let data = action.to_plutus_data();
        let f = data.fields(1, 5, "borrow").unwrap();
        assert_eq!(f[0].as_u64().unwrap(), 10);
        assert_eq!(f[1].as_u64().unwrap(), 20);
        assert_eq!(f[2].as_bytes().unwrap(), &[1, 2]);
        assert_eq!(f[3].as_u64().unwrap(), 30);
    }

    #[test]
    fn test_collateral_redeemer_delayed_merge() {
        let redeemer = CollateralRedeemer {
            action: CollateralAction::Repay,
            interest: 42,
            merge_type: MergeType::DelayedIntoPool {
                output_index: 1,
                amount_repaying: 1_000,
            },
        };
        let data = redeemer.to_plutus_data();
        let f = data.fields(0, 3, "collateral redeemer").unwrap();
        assert_eq!(f[0], PlutusData::unit(0));
        let merge = f[2].fields(1, 1, "delayed").unwrap();
        let inner = merge[0].fields(0, 2, "delayed inner").unwrap();
        assert_eq!(inner[0].as_u64().unwrap(), 1);
        assert_eq!(inner[1].as_u64().unwrap(), 1_000);
    }

    #[test]
    fn test_collateral_mint_lists() {
        let data = CollateralMint::burn(vec![9; 32]).to_plutus_data();
        let f = data.fields(0, 2, "collateral mint").unwrap();
        assert!(f[0].as_list().unwrap().is_empty());
        assert_eq!(f[1].as_list().unwrap().len(), 1);
        // empty list encodes definite, non-empty indefinite
        assert_eq!(
            hex::encode(PlutusData::List(vec![]).to_cbor().unwrap()),
            "80"
        );
    }

    #[test]
    fn test_nft_redeemer_carries_empty_option() {
        let data = NftRedeemer::Burn {
            token_name: vec![7],
        }
        .to_plutus_data();
        let f = data.fields(0, 2, "nft redeemer").unwrap();
        assert_eq!(f[0].as_variant().unwrap().0, 1);
        assert_eq!(f[1], PlutusData::unit(1));
    }

    #[test]
    fn test_order_redeemers() {
        assert_eq!(OrderRedeemer::Cancel.to_plutus_data(), PlutusData::unit(1));
        let process = OrderRedeemer::Process {
            pool_oref: oref(),
            additional_data: Some(BorrowProcessData {
                borrower_token_name: vec![5; 32],
                additional_ada: 0,
            }),
        }
        .to_plutus_data();
        let f = process.fields(0, 2, "process").unwrap();
        let some = f[1].fields(0, 1, "some").unwrap();
        assert!(some[0].fields(0, 2, "borrow data").is_ok());
    }
}
