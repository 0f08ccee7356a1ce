//! Settlement outcomes for known inputs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use drawsettle::engine::aggregator::aggregate;
use drawsettle::types::{Series, TicketRecord};

use crate::fixtures::*;

#[tokio::test]
async fn no_tickets_settles_with_fillers_only() {
    let store = memory_backend(dec!(10), dec!(50), Vec::new()).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_well_formed(&record);
    assert_eq!(record.gross_stake, Decimal::ZERO);
    assert_eq!(record.net_budget, Decimal::ZERO);
    assert_eq!(record.allocated_total, Decimal::ZERO);
    assert!(record.winning_entries.iter().all(|e| e.filler && e.payout.is_zero()));
}

#[tokio::test]
async fn single_ticket_budget_admits_only_what_fits() {
    let store = memory_backend(dec!(10), dec!(50), vec![ticket(1, r#"{"1000": 5, "3005": 3}"#)]).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_well_formed(&record);
    assert_eq!(record.gross_stake, dec!(8));
    assert_eq!(record.net_budget, dec!(4));

    let p10 = &record.winning_entries[0];
    assert!(p10.filler);
    assert_eq!(p10.payout, Decimal::ZERO);

    let p30 = &record.winning_entries[10];
    assert_eq!(p30.symbol, "3005");
    assert_eq!(p30.payout, dec!(3));
    assert_eq!(record.allocated_total, dec!(3));
}

#[tokio::test]
async fn equal_stakes_break_ties_on_smaller_symbol() {
    let tickets = vec![ticket(1, "10-05 : 7"), ticket(2, "10-02 : 7")];
    let store = memory_backend(Decimal::ZERO, dec!(100), tickets).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_well_formed(&record);
    assert_eq!(record.winning_entries[0].symbol, "1002");
    assert_eq!(record.winning_entries[0].payout, dec!(7));
}

#[tokio::test]
async fn zero_payout_ratio_pays_nothing() {
    let tickets = vec![ticket(1, "10-00 : 50, 30-00 : 20, 50-00 : 10")];
    let store = memory_backend(dec!(10), Decimal::ZERO, tickets).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_well_formed(&record);
    assert_eq!(record.gross_stake, dec!(80));
    assert_eq!(record.net_budget, Decimal::ZERO);
    assert_eq!(record.allocated_total, Decimal::ZERO);
}

#[tokio::test]
async fn unset_payout_ratio_defaults_to_zero() {
    let store = std::sync::Arc::new(drawsettle::storage::MemoryStore::new());
    store.set_operator(OPERATOR, dec!(10)).await;
    store.add_ticket(ticket(1, "10-00 : 5")).await;

    let record = settler(store).settle(&slot()).await.unwrap();
    assert_eq!(record.payout_ratio, Decimal::ZERO);
    assert_eq!(record.net_budget, Decimal::ZERO);
    assert!(record.winning_entries[0].filler);
}

#[tokio::test]
async fn tickets_outside_slot_are_ignored() {
    let mut other_time = ticket(2, "10-00 : 100");
    other_time.draw_times = r#"["9:00 PM"]"#.into();
    let mut other_day = ticket(3, "10-00 : 100");
    other_day.game_time = "28-07-2025 10:00:00".into();
    let mut other_operator = ticket(4, "10-00 : 100");
    other_operator.operator_id = "8".into();

    let tickets = vec![ticket(1, "10-00 : 1"), other_time, other_day, other_operator];
    let store = memory_backend(Decimal::ZERO, dec!(100), tickets).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_eq!(record.gross_stake, dec!(1));
    assert_eq!(record.winning_entries[0].symbol, "1000");
}

#[tokio::test]
async fn mixed_formats_and_garbage_are_tolerated() {
    let tickets = vec![
        ticket(1, "10-00 : 2, 10-00 : x, 99-99 : 4, : 1"),
        ticket(2, r#"{"10-00": "3", "bad": 2}"#),
        ticket(3, r#"[{"ticketNumber": "50-50", "quantity": 1}]"#),
        ticket(4, "not a stake string at all"),
    ];
    let store = memory_backend(Decimal::ZERO, dec!(100), tickets).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_well_formed(&record);
    assert_eq!(record.gross_stake, dec!(6));
    assert_eq!(record.winning_entries[0].symbol, "1000");
    assert_eq!(record.winning_entries[0].payout, dec!(5));
    assert_eq!(record.winning_entries[20].symbol, "5050");
}

#[tokio::test]
async fn early_prefixes_consume_budget_first() {
    // gross 30, no commission, 50% ratio → budget 15.
    let tickets = vec![ticket(1, "10-00 : 10, 30-00 : 10, 50-00 : 5, 50-01 : 5")];
    let store = memory_backend(Decimal::ZERO, dec!(50), tickets).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    assert_well_formed(&record);
    assert_eq!(record.net_budget, dec!(15));
    assert_eq!(record.winning_entries[0].symbol, "1000");
    assert!(record.winning_entries[10].filler);
    assert_eq!(record.winning_entries[20].symbol, "5000");
    assert_eq!(record.allocated_total, dec!(15));
}

#[tokio::test]
async fn series_breakdown_reports_commission() {
    let tickets = vec![ticket(1, "10-00 : 10, 11-00 : 10, 30-00 : 5")];
    let store = memory_backend(dec!(10), dec!(50), tickets).await;
    let record = settler(store).settle(&slot()).await.unwrap();

    let a = &record.series_stakes[0];
    assert_eq!(a.series, Series::A);
    assert_eq!(a.entries, 2);
    assert_eq!(a.gross, dec!(20));
    assert_eq!(a.commission_amount, dec!(2));
    assert_eq!(a.net, dec!(18));
    assert_eq!(record.series_stakes[2].gross, Decimal::ZERO);
}

#[tokio::test]
async fn shuffled_tickets_settle_identically() {
    let mut tickets: Vec<TicketRecord> = (0..40)
        .map(|i| {
            let prefix = [10, 30, 50][i % 3] + (i % 10) as u32;
            ticket(i as i64, &format!("{prefix}-{:02} : {}, 10-00 : 1", i % 7, i % 5 + 1))
        })
        .collect();

    let forward_store = memory_backend(dec!(12), dec!(70), tickets.clone()).await;
    let forward = settler(forward_store).settle(&slot()).await.unwrap();

    tickets.reverse();
    tickets.swap(3, 17);
    assert_eq!(aggregate(&tickets, &slot()), aggregate(tickets.iter().rev(), &slot()));

    let shuffled_store = memory_backend(dec!(12), dec!(70), tickets).await;
    let shuffled = settler(shuffled_store).settle(&slot()).await.unwrap();

    assert_well_formed(&forward);
    assert_eq!(forward.gross_stake, shuffled.gross_stake);
    assert_eq!(forward.net_budget, shuffled.net_budget);
    assert_eq!(forward.winning_entries, shuffled.winning_entries);
    assert_eq!(forward.allocated_total, shuffled.allocated_total);
}
