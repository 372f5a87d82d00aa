//! Integration Tests
//!
//! Cross-module scenarios: reading a pool from the ledger, running the
//! models over it and checking the successor state the assemblers write.

#[cfg(test)]
mod tests {
    use crate::fees::{get_platform_fee, platform_fee_amount};
    use crate::interest::{get_accrued_interest, get_interest_rate, rate_at_utilization};
    use crate::liquidity::{amount_for_lp_burn, lp_burn_for_withdraw, lp_tokens_for_deposit};
    use crate::orders::fixtures::all_orders;
    use crate::testing::*;
    use crate::*;

    const ONE_ADA: u64 = 1_000_000;

    // ============================================================================
    // Pool Transition Scenarios
    // ============================================================================

    #[tokio::test]
    async fn test_borrow_from_fresh_pool() {
        let config = sdk_config();
        let ledger = MockLedger::new().with_pool(&config, &pool_state(100 * ONE_ADA, 0, 100 * ONE_ADA), &pool_config());
        let snapshot = PoolStateReader::new(&ledger, &config).read_pool(&POOL_NFT_NAME).await.unwrap();

        let loan = 10 * ONE_ADA;
        let rate = get_interest_rate(
            &snapshot.config.interest_params,
            loan,
            snapshot.pool.lent_out,
            snapshot.pool.balance,
        )
        .unwrap();
        // 10% utilization on the base curve
        assert_eq!(rate, rate_at_utilization(&snapshot.config.interest_params, 100_000).unwrap());
        assert_eq!(rate, 37_500);

        let next = snapshot.pool.after_borrow(loan, snapshot.config.pool_fee).unwrap();
        assert_eq!(next.balance, 100 * ONE_ADA - loan + snapshot.config.pool_fee);
        assert_eq!(next.lent_out, loan);
        assert_eq!(next.params, snapshot.pool.params);
    }

    #[test]
    fn test_deposit_into_small_pool() {
        let pool = pool_state(ONE_ADA, 0, ONE_ADA);
        let lp = lp_tokens_for_deposit(pool.balance, pool.lent_out, ONE_ADA, pool.total_lp_tokens).unwrap();
        assert_eq!(lp, 1_000_000);

        let next = pool.after_deposit(ONE_ADA, lp, 0).unwrap();
        assert_eq!(next.total_lp_tokens, 2_000_000);
        assert_eq!(next.balance, 2_000_000);
    }

    #[test]
    fn test_small_withdrawal_rejected_before_assembly() {
        let config = pool_config();
        let err = config.check_transition(config.min_transition - 1).unwrap_err();
        assert_eq!(
            err,
            LendingError::BelowProtocolMinimum {
                amount: config.min_transition - 1,
                minimum: config.min_transition,
            }
        );
    }

    #[test]
    fn test_loan_lifecycle_returns_value_to_pool() {
        let config = pool_config();
        let pool = pool_state(500 * ONE_ADA, 0, 500 * ONE_ADA);
        let loan = 100 * ONE_ADA;
        let start = 1_700_000_000_000;

        let rate = get_interest_rate(&config.interest_params, loan, pool.lent_out, pool.balance).unwrap();
        let borrowed = pool.after_borrow(loan, config.pool_fee).unwrap();

        // thirty days later
        let interest = get_accrued_interest(rate, loan, start, start + 30 * 86_400_000).unwrap();
        let closed = borrowed.after_loan_closed(loan, interest, config.pool_fee).unwrap();
        assert_eq!(closed.lent_out, 0);
        assert_eq!(closed.balance, pool.balance + interest + 2 * config.pool_fee);

        let fee_rate = get_platform_fee(loan, pool.balance, pool.lent_out, &config.loan_fee_details).unwrap();
        let fee = platform_fee_amount(interest, fee_rate).unwrap();
        assert!(fee < interest);
    }

    // ============================================================================
    // Model Properties
    // ============================================================================

    #[test]
    fn test_interest_monotonic_over_full_range() {
        let curve = pool_config().interest_params;
        let mut previous = 0;
        for utilization in (0..=1_000_000).step_by(2_500) {
            let rate = rate_at_utilization(&curve, utilization).unwrap();
            assert!(rate >= previous, "rate fell at {}", utilization);
            previous = rate;
        }
    }

    #[test]
    fn test_minimum_interest_charge() {
        for (rate, principal) in [(1, 1), (37_500, 10 * ONE_ADA), (3_000_000, u32::MAX as u64)] {
            assert_eq!(get_accrued_interest(rate, principal, 42, 42).unwrap(), 1);
        }
    }

    #[test]
    fn test_deposit_then_burn_never_gains() {
        let states = [
            (ONE_ADA, 0, ONE_ADA),
            (73 * ONE_ADA + 17, 11 * ONE_ADA + 3, 80 * ONE_ADA - 9),
            (5, 999_999_999, 12_345),
        ];
        for (balance, lent_out, total_lp) in states {
            for deposit in [1, 999, ONE_ADA, 7_777_777] {
                let lp = lp_tokens_for_deposit(balance, lent_out, deposit, total_lp).unwrap();
                let back = amount_for_lp_burn(lp, balance, lent_out, total_lp).unwrap();
                assert!(back <= deposit);
                let burn = lp_burn_for_withdraw(balance, lent_out, deposit, total_lp).unwrap();
                assert_eq!(burn, lp);
            }
        }
    }

    // ============================================================================
    // Order and Event Flow
    // ============================================================================

    #[tokio::test]
    async fn test_every_order_survives_the_ledger() {
        let config = sdk_config();
        let mut ledger = MockLedger::new();
        let orders = all_orders();
        for (i, order) in orders.iter().enumerate() {
            ledger = ledger.with_utxo(Utxo {
                out_ref: OutputReference::new(vec![0x0d; 32], i as u64),
                address: config.order_address(&config.scripts.order_deposit),
                value: Value::lovelace(4_000_000),
                datum: Some(PlutusData::from_cbor(&order.to_plutus_data().to_cbor().unwrap()).unwrap()),
            });
        }

        let reader = PoolStateReader::new(&ledger, &config);
        for (i, order) in orders.iter().enumerate() {
            let found = reader.read_order(&OutputReference::new(vec![0x0d; 32], i as u64)).await.unwrap();
            assert_eq!(&found.datum, order);
        }
    }

    #[test]
    fn test_response_carries_events() {
        let mut log = EventLog::new();
        log.emit(PoolEvent::LiquidityAdded {
            pool_nft_name: POOL_NFT_NAME.to_vec(),
            amount: ONE_ADA,
            lp_minted: ONE_ADA,
            timestamp_ms: 0,
        });
        let tx = CompletedTx {
            tx_hash: "00".into(),
            cbor_hex: String::new(),
            fee: MOCK_FEE,
            plan: TxPlan::default(),
        };
        let response = BuilderResponse::from_result("deposit", Ok((tx.clone(), log)));
        assert!(response.success);
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.into_result().unwrap(), tx);
    }
}
