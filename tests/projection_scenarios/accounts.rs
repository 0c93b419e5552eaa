//! Bank account projections
//!
//! Three models over one log:
//! - accounts: balances; withdrawals read the current balance and are
//!   rejected when it is too low
//! - deposits: running deposit total per account, read from its own collection
//! - statements: written when an account closes, reading the accounts model

use crate::common::*;
use foldline::{
    to_document, to_pipeline, ChangeOp, Document, Event, Interests, Interrupt, Model, ModelId,
    Pipeline,
};
use serde_json::{json, Value};

// ============================================================================
// Models
// ============================================================================

fn account_of(e: &Event) -> Result<String, Interrupt> {
    e.payload
        .get("account")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Interrupt::msg(format!("event {} has no account", e.id)))
}

fn amount_of(e: &Event) -> Result<i64, Interrupt> {
    e.payload
        .get("amount")
        .and_then(Value::as_i64)
        .ok_or_else(|| Interrupt::msg(format!("event {} has no amount", e.id)))
}

fn by_account(account: &str) -> foldline::Result<Pipeline> {
    to_pipeline(json!([{"$match": {"account": account}}]))
}

fn number(docs: &[Document], field: &str) -> i64 {
    docs.first()
        .and_then(|d| d.get(field))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

pub fn accounts_model(version: &str) -> Model {
    Model::new("accounts", version, |e, ctx| {
        let account = account_of(e)?;
        let filter = to_document(json!({"account": account}))?;
        let op = match e.event_type.as_str() {
            "opened" => ChangeOp::insert_one(to_document(
                json!({"account": account, "balance": 0, "status": "open"}),
            )?),
            "deposited" => ChangeOp::update_one(
                filter,
                to_document(json!({"$inc": {"balance": amount_of(e)?}}))?,
            ),
            "withdrawn" => {
                let amount = amount_of(e)?;
                let current = ctx.read(by_account(&account)?)?;
                let changes = if number(&current, "balance") >= amount {
                    json!({"$inc": {"balance": -amount}})
                } else {
                    json!({"$inc": {"rejected": 1}})
                };
                ChangeOp::update_one(filter, to_document(changes)?)
            }
            "closed" => ChangeOp::update_one(filter, to_document(json!({"$set": {"status": "closed"}}))?),
            _ => return Ok(Vec::new()),
        };
        Ok(vec![op])
    })
    .with_interests(Interests::only(["opened", "deposited", "withdrawn", "closed"]))
}

pub fn deposits_model() -> Model {
    Model::new("deposits", "1", |e, ctx| {
        if e.event_type != "deposited" {
            return Ok(Vec::new());
        }
        let account = account_of(e)?;
        let amount = amount_of(e)?;
        let previous = ctx.read(to_pipeline(json!([
            {"$match": {"account": account}},
            {"$sort": {"event": -1}},
            {"$limit": 1}
        ]))?)?;
        let running = number(&previous, "running") + amount;
        Ok(vec![ChangeOp::insert_one(to_document(json!({
            "event": e.id,
            "account": account,
            "amount": amount,
            "running": running
        }))?)])
    })
    .with_interests(Interests::only(["deposited"]))
}

pub fn statements_model(accounts: ModelId) -> Model {
    Model::new("statements", "1", move |e, ctx| {
        if e.event_type != "closed" {
            return Ok(Vec::new());
        }
        let account = account_of(e)?;
        let state = ctx.read_from(&accounts, by_account(&account)?)?;
        let status = state
            .first()
            .and_then(|d| d.get("status"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(vec![ChangeOp::insert_one(to_document(json!({
            "account": account,
            "final_balance": number(&state, "balance"),
            "status": status
        }))?)])
    })
    .with_interests(Interests::only(["closed"]))
}

pub fn all_models() -> Vec<Model> {
    let accounts = accounts_model("1");
    let statements = statements_model(accounts.id().clone());
    vec![accounts, deposits_model(), statements]
}

pub fn bank_log() -> Vec<Event> {
    vec![
        Event::new(1, "opened", json!({"account": "alice"})),
        Event::new(2, "opened", json!({"account": "bob"})),
        Event::new(3, "deposited", json!({"account": "alice", "amount": 100})),
        Event::new(4, "deposited", json!({"account": "bob", "amount": 50})),
        Event::new(5, "withdrawn", json!({"account": "alice", "amount": 30})),
        Event::new(6, "withdrawn", json!({"account": "bob", "amount": 80})),
        Event::new(7, "deposited", json!({"account": "bob", "amount": 40})),
        Event::new(8, "closed", json!({"account": "alice"})),
    ]
}

// ============================================================================
// Expected state
// ============================================================================

pub fn assert_bank_state(projections: &foldline::ProjectionStore<foldline::MemoryStore>) -> anyhow::Result<()> {
    let accounts = ordered_by(projections, &ModelId::new("accounts", "1"), "account")?;
    assert_eq!(column(&accounts, "account"), vec![json!("alice"), json!("bob")]);
    assert_eq!(column(&accounts, "balance"), vec![json!(70), json!(90)]);
    assert_eq!(column(&accounts, "status"), vec![json!("closed"), json!("open")]);
    assert_eq!(column(&accounts, "rejected"), vec![Value::Null, json!(1)]);

    let deposits = ordered_by(projections, &ModelId::new("deposits", "1"), "event")?;
    assert_eq!(column(&deposits, "event"), vec![json!(3), json!(4), json!(7)]);
    assert_eq!(column(&deposits, "running"), vec![json!(100), json!(50), json!(90)]);

    let statements = ordered_by(projections, &ModelId::new("statements", "1"), "account")?;
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0]["final_balance"], json!(70));
    assert_eq!(statements[0]["status"], json!("closed"));
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn bank_log_projects_every_model() -> anyhow::Result<()> {
    let (_, projections) = open_store("bank", all_models())?;

    let changes = projections.handle_events(&bank_log())?;

    assert_bank_state(&projections)?;
    assert_eq!(changes["accounts_v1"].added, 2);
    assert_eq!(changes["accounts_v1"].updated, 6);
    assert_eq!(changes["deposits_v1"].added, 3);
    assert_eq!(changes["statements_v1"].added, 1);
    assert_eq!(projections.last_seen_id()?, 8);
    Ok(())
}

#[test]
fn store_interest_is_the_union_of_model_interests() -> anyhow::Result<()> {
    let (_, projections) = open_store("bank", all_models())?;
    assert_eq!(
        projections.interests().event_types(),
        vec!["closed", "deposited", "opened", "withdrawn"]
    );
    Ok(())
}

#[test]
fn version_bump_projects_into_a_fresh_collection() -> anyhow::Result<()> {
    let (store, v1) = open_store("bank", all_models())?;
    v1.handle_events(&bank_log())?;

    let v2 = foldline::ProjectionStore::open(
        foldline::StoreConfig::new("bank-v2"),
        std::sync::Arc::clone(&store),
        vec![accounts_model("2")],
    )?;
    assert_eq!(v2.last_seen_id()?, 0);

    v2.handle_events(&bank_log()[..4])?;
    let fresh = ordered_by(&v2, &ModelId::new("accounts", "2"), "account")?;
    assert_eq!(column(&fresh, "balance"), vec![json!(100), json!(50)]);

    // The old version is untouched
    assert_bank_state(&v1)?;
    assert_eq!(v2.last_seen_id()?, 4);
    assert_eq!(v1.last_seen_id()?, 8);
    Ok(())
}
