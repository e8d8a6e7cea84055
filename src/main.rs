//! Coverage protocol simulation.
//!
//! Walks the protocol through underwriting, levered index allocation, a claim and
//! its settlement, and prints the premium curve. `RUST_LOG=debug` shows every event.

use cover_core::*;
use tracing_subscriber::filter::EnvFilter;

const E18: u128 = 1_000_000_000_000_000_000;

type SimResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Mutualized Coverage Simulation\n");

    scenario_1_underwriting()?;
    scenario_2_levered_index()?;
    scenario_3_claim_and_resume()?;
    scenario_4_premium_curve()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn fund(protocol: &mut Protocol, account: AccountId, amount: Amount) -> SimResult {
    protocol.token_mut().mint(Party::Account(account), amount)?;
    Ok(())
}

fn tokens(amount: Amount) -> String {
    format!("{:.4}", amount as f64 / E18 as f64)
}

/// Direct LPs underwrite a pool and earn the premium.
fn scenario_1_underwriting() -> SimResult {
    println!("Scenario 1: Underwriting a Pool\n");

    let owner = AccountId(100);
    let (mut protocol, cap) = Protocol::new(owner, ProtocolConfig::default(), EngineConfig::default())?;
    let pool = protocol.create_pool(&cap)?;

    let alice = AccountId(1);
    let buyer = AccountId(2);
    fund(&mut protocol, alice, 100_000 * E18)?;
    fund(&mut protocol, buyer, 10_000 * E18)?;

    protocol.deposit(pool, alice, 100_000 * E18)?;
    println!("  Alice deposits 100,000 into pool {}", pool.0);
    println!("  Quote: {}", protocol.current_premium_rate(pool)?);

    let receipt = protocol.insure(
        pool,
        buyer,
        CoverRequest {
            amount: 20_000 * E18,
            max_cost: 5_000 * E18,
            span_secs: 30 * DAY,
            target: Hash32([1u8; 32]),
            insured: buyer,
        },
    )?;
    println!(
        "  Buyer covers 20,000 for 30 days: premium {}, protocol fee {}",
        tokens(receipt.premium),
        tokens(receipt.protocol_fee)
    );
    println!("  Utilization: {}", protocol.utilization_rate(pool)?);

    protocol.advance_time(30 * DAY + protocol.params().pool.grace_secs + 1);
    protocol.unlock(pool, receipt.insurance.id)?;
    println!("  Cover expired and unlocked, utilization {}", protocol.utilization_rate(pool)?);

    let shares = protocol.pool(pool).map(|p| p.lp().balance_of(alice)).unwrap_or(0);
    protocol.request_withdraw(pool, alice, shares)?;
    protocol.advance_time(protocol.params().pool.lockup_secs + 1);
    let paid = protocol.withdraw(pool, alice, shares)?;
    println!("  Alice withdraws {} (treasury keeps {})\n", tokens(paid), tokens(protocol.treasury_value()));
    Ok(())
}

/// An index levers its depositors' capital across two pools.
fn scenario_2_levered_index() -> SimResult {
    println!("Scenario 2: Levered Index\n");

    let owner = AccountId(100);
    let (mut protocol, cap) = Protocol::new(owner, ProtocolConfig::default(), EngineConfig::default())?;
    let first = protocol.create_pool(&cap)?;
    let second = protocol.create_pool(&cap)?;
    let index = protocol.create_index(&cap)?;
    protocol.set(&cap, index, 0, Some(first), 2_000)?;
    protocol.set(&cap, index, 1, Some(second), 3_000)?;

    let carol = AccountId(3);
    let buyer = AccountId(4);
    fund(&mut protocol, carol, 10_000 * E18)?;
    fund(&mut protocol, buyer, 1_000 * E18)?;

    protocol.index_deposit(index, carol, 10_000 * E18)?;
    println!("  Carol deposits 10,000 into a 2x index over two pools (weights 2:3)");
    for pool in [first, second] {
        let credit = protocol.pool(pool).map(|p| p.credit_of(index)).unwrap_or(0);
        println!("  Pool {} credit: {}", pool.0, tokens(credit));
    }
    println!("  Index leverage: {}", protocol.index_leverage(index)?);

    protocol.insure(
        second,
        buyer,
        CoverRequest {
            amount: 6_000 * E18,
            max_cost: 1_000 * E18,
            span_secs: 30 * DAY,
            target: Hash32([2u8; 32]),
            insured: buyer,
        },
    )?;
    println!("  Index liquidity after premiums: {}", tokens(protocol.index_total_liquidity(index)?));
    println!("  Index withdrawable: {}", tokens(protocol.index_withdrawable(index)?));

    protocol.set_leverage(&cap, index, 1_000)?;
    println!("  Leverage target cut to 1x: {}\n", protocol.index_leverage(index)?);
    Ok(())
}

/// A hack is reported, covered holders redeem, the index and pool LPs share the loss.
fn scenario_3_claim_and_resume() -> SimResult {
    println!("Scenario 3: Claim and Resume\n");

    let owner = AccountId(100);
    let (mut protocol, cap) = Protocol::new(owner, ProtocolConfig::default(), EngineConfig::default())?;
    let pool = protocol.create_pool(&cap)?;
    let index = protocol.create_index(&cap)?;
    protocol.set(&cap, index, 0, Some(pool), 1_000)?;

    let lp = AccountId(5);
    let carol = AccountId(6);
    let victim = AccountId(7);
    fund(&mut protocol, lp, 10_000 * E18)?;
    fund(&mut protocol, carol, 5_000 * E18)?;
    fund(&mut protocol, victim, 1_000 * E18)?;

    protocol.deposit(pool, lp, 10_000 * E18)?;
    protocol.index_deposit(index, carol, 5_000 * E18)?;
    let target = Hash32([9u8; 32]);
    let receipt = protocol.insure(
        pool,
        victim,
        CoverRequest {
            amount: 4_000 * E18,
            max_cost: 1_000 * E18,
            span_secs: 60 * DAY,
            target,
            insured: victim,
        },
    )?;
    println!("  Pool liquidity {} (half of it index credit)", tokens(protocol.pool_total_liquidity(pool)?));

    protocol.advance_time(10 * DAY);
    let tree = ClaimTree::new(&[ClaimLeaf { target, insured: victim }]);
    let incident = Incident {
        payout_numerator: 1,
        payout_denominator: 2,
        incident_timestamp: protocol.time(),
        merkle_root: tree.root(),
        raw_data: "protocol exploit".to_string(),
        memo: "50% payout".to_string(),
    };
    let locked = protocol.apply_cover(&cap, pool, incident, 7 * DAY)?;
    println!("  Incident applied, {} index locked", locked.len());

    let payout = protocol.redeem(pool, receipt.insurance.id, victim, &tree.proof(0))?;
    println!("  Victim redeems {}", tokens(payout));

    protocol.advance_time(7 * DAY + 1);
    let report = protocol.resume_pool(pool)?;
    println!(
        "  Resume: debt {}, index paid {}, reserve paid {}, pool LPs paid {}, unresolved {}",
        tokens(report.debt),
        tokens(report.compensated()),
        tokens(report.from_reserve()),
        tokens(report.offset_by_pool),
        tokens(report.shortage)
    );
    println!("  Index resumed: {}", !report.resumed_indices.is_empty());
    println!("  Books consistent: {}\n", protocol.invariants_hold());
    Ok(())
}

/// The curve at a few utilizations.
fn scenario_4_premium_curve() -> SimResult {
    println!("Scenario 4: Premium Curve\n");

    let curve = BondingPremium::default();
    let total = 1_000_000 * E18;
    for util in [0u128, 25, 50, 75, 79, 90, 99] {
        let rate = curve.current_rate(total, total / 100 * util)?;
        println!("  utilization {:>2}%: {}", util, rate);
    }

    let premium = curve.premium(10_000 * E18, YEAR, total, total / 2)?;
    println!("  One year of 10,000 cover at 50% utilization costs {}", tokens(premium));
    Ok(())
}
