//! Price Feeds and AMM Conversion
//!
//! Oracle price feeds value a native asset in lovelace, either from a
//! constant-product reserve snapshot (`Pooled`) or a plain quoted price
//! (`Aggregated`). Pooled conversions apply the 0.3% swap fee.

use crate::constants::amm::{FEE_DENOMINATOR, FEE_NUMERATOR};
use crate::errors::{LendingError, LendingResult};
use crate::math::{big, div_floor, to_u64};
use crate::plutus::{FromPlutusData, PlutusData, ToPlutusData};
use crate::types::{AssetClass, PriceSnapshot};

/// Reserve snapshot: `token_a_amount` of `token` against `token_b_amount` lovelace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledPrice {
    pub token: AssetClass,
    pub token_a_amount: u64,
    pub token_b_amount: u64,
    pub valid_to: i64,
}

/// Quoted price: `token_price_in_lovelaces / denominator` lovelace per unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedPrice {
    pub token: AssetClass,
    pub token_price_in_lovelaces: u64,
    pub denominator: u64,
    pub valid_to: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceFeed {
    Aggregated(Vec<AggregatedPrice>),
    Pooled(Vec<PooledPrice>),
}

enum Quote<'a> {
    Pooled(&'a PooledPrice),
    Aggregated(&'a AggregatedPrice),
}

impl PriceFeed {
    /// Single-asset pooled feed built from a caller snapshot
    pub fn pooled(token: AssetClass, snapshot: PriceSnapshot, valid_to: i64) -> Self {
        PriceFeed::Pooled(vec![PooledPrice {
            token,
            token_a_amount: snapshot.token_amount,
            token_b_amount: snapshot.lovelace_amount,
            valid_to,
        }])
    }

    fn quote(&self, asset: &AssetClass) -> LendingResult<Quote<'_>> {
        let found = match self {
            PriceFeed::Pooled(entries) => entries.iter().find(|p| &p.token == asset).map(Quote::Pooled),
            PriceFeed::Aggregated(entries) => {
                entries.iter().find(|p| &p.token == asset).map(Quote::Aggregated)
            }
        };
        found.ok_or_else(|| LendingError::OraclePriceUnavailable {
            asset: asset.unit(),
        })
    }
}

/// Lovelace received for selling `amount` of `asset`
///
/// Pooled: `floor(x*997*B / (A*1000 + x*997))`; aggregated: `floor(x*p/d)`.
pub fn ada_if_sold(feed: &PriceFeed, asset: &AssetClass, amount: u64) -> LendingResult<u64> {
    match feed.quote(asset)? {
        Quote::Pooled(p) => {
            let sold = big(amount) * big(FEE_NUMERATOR);
            let numerator = &sold * big(p.token_b_amount);
            let denominator = big(p.token_a_amount) * big(FEE_DENOMINATOR) + sold;
            to_u64(&div_floor(&numerator, &denominator)?)
        }
        Quote::Aggregated(p) => aggregated_value(p, amount),
    }
}

/// Lovelace needed to buy `amount` of `asset`
///
/// Pooled: `floor(x*1000*B / ((A - x)*997))`; buying the whole reserve
/// or more is impossible and rejected.
pub fn ada_if_bought(feed: &PriceFeed, asset: &AssetClass, amount: u64) -> LendingResult<u64> {
    match feed.quote(asset)? {
        Quote::Pooled(p) => {
            if amount >= p.token_a_amount {
                return Err(LendingError::InvalidInput {
                    param: "amount",
                    reason: "exceeds pooled reserve",
                });
            }
            let numerator = big(amount) * big(FEE_DENOMINATOR) * big(p.token_b_amount);
            let denominator = big(p.token_a_amount - amount) * big(FEE_NUMERATOR);
            to_u64(&div_floor(&numerator, &denominator)?)
        }
        Quote::Aggregated(p) => aggregated_value(p, amount),
    }
}

/// Units of `asset` obtained by selling `lovelace`
///
/// Pooled: `floor(s*997*A / (B*1000 + s*997))`; aggregated: `floor(s*d/p)`.
pub fn asset_gain_ada_sale(feed: &PriceFeed, asset: &AssetClass, lovelace: u64) -> LendingResult<u64> {
    match feed.quote(asset)? {
        Quote::Pooled(p) => {
            let sold = big(lovelace) * big(FEE_NUMERATOR);
            let numerator = &sold * big(p.token_a_amount);
            let denominator = big(p.token_b_amount) * big(FEE_DENOMINATOR) + sold;
            to_u64(&div_floor(&numerator, &denominator)?)
        }
        Quote::Aggregated(p) => to_u64(&div_floor(
            &(big(lovelace) * big(p.denominator)),
            &big(p.token_price_in_lovelaces),
        )?),
    }
}

fn aggregated_value(price: &AggregatedPrice, amount: u64) -> LendingResult<u64> {
    to_u64(&div_floor(
        &(big(amount) * big(price.token_price_in_lovelaces)),
        &big(price.denominator),
    )?)
}

// ============ Wire Format ============

impl ToPlutusData for PriceFeed {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            PriceFeed::Aggregated(entries) => PlutusData::constr(
                0,
                vec![PlutusData::List(
                    entries
                        .iter()
                        .map(|p| {
                            PlutusData::constr(
                                0,
                                vec![
                                    p.token.to_plutus_data(),
                                    PlutusData::int(p.token_price_in_lovelaces),
                                    PlutusData::int(p.denominator),
                                    PlutusData::int(p.valid_to),
                                ],
                            )
                        })
                        .collect(),
                )],
            ),
            PriceFeed::Pooled(entries) => PlutusData::constr(
                1,
                vec![PlutusData::List(
                    entries
                        .iter()
                        .map(|p| {
                            PlutusData::constr(
                                0,
                                vec![
                                    p.token.to_plutus_data(),
                                    PlutusData::int(p.token_a_amount),
                                    PlutusData::int(p.token_b_amount),
                                    PlutusData::int(p.valid_to),
                                ],
                            )
                        })
                        .collect(),
                )],
            ),
        }
    }
}

impl FromPlutusData for PriceFeed {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        match data.as_variant()? {
            (0, [entries]) => {
                let mut out = Vec::new();
                for entry in entries.as_list()? {
                    let f = entry.fields(0, 4, "aggregated price")?;
                    out.push(AggregatedPrice {
                        token: AssetClass::from_plutus_data(&f[0])?,
                        token_price_in_lovelaces: f[1].as_u64()?,
                        denominator: f[2].as_u64()?,
                        valid_to: f[3].as_i64()?,
                    });
                }
                Ok(PriceFeed::Aggregated(out))
            }
            (1, [entries]) => {
                let mut out = Vec::new();
                for entry in entries.as_list()? {
                    let f = entry.fields(0, 4, "pooled price")?;
                    out.push(PooledPrice {
                        token: AssetClass::from_plutus_data(&f[0])?,
                        token_a_amount: f[1].as_u64()?,
                        token_b_amount: f[2].as_u64()?,
                        valid_to: f[3].as_i64()?,
                    });
                }
                Ok(PriceFeed::Pooled(out))
            }
            _ => Err(LendingError::InvalidDatumShape {
                expected: "price feed",
            }),
        }
    }
}

/// Oracle signature over a price feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData {
    pub signature: Vec<u8>,
    pub key_position: u64,
}

/// Withdrawal redeemer presented to the oracle validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRedeemer {
    pub data: PriceFeed,
    pub signatures: Vec<SignedData>,
}

impl ToPlutusData for OracleRedeemer {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.data.to_plutus_data(),
                PlutusData::List(
                    self.signatures
                        .iter()
                        .map(|s| {
                            PlutusData::constr(
                                0,
                                vec![PlutusData::bytes(&s.signature), PlutusData::int(s.key_position)],
                            )
                        })
                        .collect(),
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AssetClass {
        AssetClass::new(vec![0xaa; 28], b"TKN".to_vec())
    }

    fn pooled(a: u64, b: u64) -> PriceFeed {
        PriceFeed::pooled(token(), PriceSnapshot::new(a, b), 0)
    }

    #[test]
    fn test_pooled_sale() {
        // 1000 tokens against 2000 lovelace, selling 100
        // floor(100*997*2000 / (1000*1000 + 100*997)) = floor(199_400_000 / 1_099_700)
        assert_eq!(ada_if_sold(&pooled(1_000, 2_000), &token(), 100).unwrap(), 181);
    }

    #[test]
    fn test_pooled_purchase() {
        // floor(100*1000*2000 / (900*997)) = floor(200_000_000 / 897_300)
        assert_eq!(ada_if_bought(&pooled(1_000, 2_000), &token(), 100).unwrap(), 222);
        assert!(ada_if_bought(&pooled(1_000, 2_000), &token(), 1_000).is_err());
    }

    #[test]
    fn test_pooled_gain_from_ada() {
        // floor(200*997*1000 / (2000*1000 + 200*997))
        assert_eq!(asset_gain_ada_sale(&pooled(1_000, 2_000), &token(), 200).unwrap(), 90);
    }

    #[test]
    fn test_buy_costs_more_than_sale_yields() {
        let feed = pooled(5_000_000, 9_000_000);
        for amount in [1u64, 10, 1_000, 100_000] {
            assert!(ada_if_bought(&feed, &token(), amount).unwrap() >= ada_if_sold(&feed, &token(), amount).unwrap());
        }
    }

    #[test]
    fn test_aggregated_conversions() {
        let feed = PriceFeed::Aggregated(vec![AggregatedPrice {
            token: token(),
            token_price_in_lovelaces: 3,
            denominator: 2,
            valid_to: 0,
        }]);
        assert_eq!(ada_if_sold(&feed, &token(), 5).unwrap(), 7);
        assert_eq!(ada_if_bought(&feed, &token(), 5).unwrap(), 7);
        assert_eq!(asset_gain_ada_sale(&feed, &token(), 7).unwrap(), 4);
    }

    #[test]
    fn test_unknown_asset() {
        let other = AssetClass::new(vec![1; 28], vec![]);
        assert!(matches!(
            ada_if_sold(&pooled(1, 1), &other, 1),
            Err(LendingError::OraclePriceUnavailable { .. })
        ));
    }

    #[test]
    fn test_feed_wire_round_trip() {
        let feed = PriceFeed::pooled(token(), PriceSnapshot::new(10, 20), 1_700_000_840_000);
        let data = feed.to_plutus_data();
        assert_eq!(data.as_variant().unwrap().0, 1);
        assert_eq!(PriceFeed::from_plutus_data(&data).unwrap(), feed);
    }
}
