//! Linkage scenarios over the in-memory log: versioning, links, confirmations
//! and totals as a sequence of submissions would exercise them.

use endorser_linkage::{
    ConflictKind, LinkageError, LinkageResolver, SubmitReceipt, TotalsRequest, UnitTotals,
};
use endorser_store::QueryWindow;
use endorser_types::{SequenceId, VerifiedClaim};
use serde_json::{json, Value};

const X: &str = "did:ethr:0x1111111111111111111111111111111111111111";
const Y: &str = "did:ethr:0x2222222222222222222222222222222222222222";
const Z: &str = "did:ethr:0x3333333333333333333333333333333333333333";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn submit(resolver: &LinkageResolver, issuer: &str, payload: Value) -> SubmitReceipt {
    resolver
        .submit(VerifiedClaim::new(issuer, payload))
        .await
        .unwrap()
}

fn handle(receipt: &SubmitReceipt) -> String {
    receipt.handle_id.as_ref().unwrap().to_string()
}

fn hur(amount: u64) -> Value {
    json!({"@type": "TypeAndQuantityNode", "amountOfThisGood": amount, "unitCode": "HUR"})
}

fn totals(entries: &[(&str, f64)]) -> UnitTotals {
    entries
        .iter()
        .map(|(unit, amount)| (unit.to_string(), *amount))
        .collect()
}

async fn plan(resolver: &LinkageResolver, issuer: &str, name: &str) -> SubmitReceipt {
    submit(resolver, issuer, json!({"@type": "PlanAction", "name": name})).await
}

async fn give_to_plan(
    resolver: &LinkageResolver,
    issuer: &str,
    plan: &str,
    amount: u64,
) -> SubmitReceipt {
    submit(
        resolver,
        issuer,
        json!({
            "@type": "GiveAction",
            "fulfills": {"@type": "PlanAction", "identifier": plan},
            "object": hur(amount),
            "description": format!("{amount} hours for the plan"),
        }),
    )
    .await
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plan_offer_give_end_to_end() {
    let resolver = LinkageResolver::in_memory();
    let plan = plan(&resolver, X, "Community garden").await;
    let h1 = handle(&plan);

    let offer = submit(
        &resolver,
        Y,
        json!({
            "@type": "Offer",
            "includesObject": hur(1),
            "itemOffered": {"isPartOf": {"@type": "PlanAction", "identifier": h1}}
        }),
    )
    .await;
    let o = handle(&offer);

    let offered = resolver
        .offer_totals(None, &TotalsRequest::for_plan(&h1))
        .await
        .unwrap();
    assert_eq!(offered, totals(&[("HUR", 1.0)]));

    let give = submit(
        &resolver,
        Y,
        json!({
            "@type": "GiveAction",
            "fulfills": {"@type": "Offer", "identifier": o, "lastClaimId": offer.sequence_id.to_string()},
            "object": hur(1)
        }),
    )
    .await;
    assert!(give.primary_link().unwrap().link_confirmed);

    let offers = resolver.offers(Some(&o), QueryWindow::default()).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].amount_given, 1.0);
    assert_eq!(offers[0].amount_given_confirmed, 0.0);
    assert_eq!(offers[0].recipient_plan_id.as_ref().unwrap().as_str(), h1);
    assert_eq!(offers[0].offered_by_did.as_deref(), Some(Y));

    let gives = resolver
        .gives(Some(&handle(&give)), QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(gives[0].fulfills_handle_id.as_ref().unwrap().as_str(), o);
    assert_eq!(gives[0].fulfills_type.as_deref(), Some("Offer"));
    assert_eq!(
        gives[0].fulfills_plan_handle_id.as_ref().unwrap().as_str(),
        h1
    );
    assert_eq!(gives[0].fulfills_plan_last_claim_id, Some(plan.sequence_id));

    let to_plan = resolver.offers_to_plan(&h1).await.unwrap();
    assert_eq!(to_plan.len(), 1);
    assert_eq!(to_plan[0].handle_id.as_str(), o);
}

#[tokio::test]
async fn editing_the_parent_unconfirms_the_link() {
    let resolver = LinkageResolver::in_memory();
    let offer = submit(&resolver, X, json!({"@type": "Offer", "includesObject": hur(3)})).await;
    let o = handle(&offer);
    let give = submit(
        &resolver,
        Y,
        json!({
            "@type": "GiveAction",
            "fulfills": {"@type": "Offer", "identifier": o, "lastClaimId": offer.sequence_id.value()},
            "object": hur(1)
        }),
    )
    .await;
    let g = handle(&give);

    let before = resolver.gives(Some(&g), QueryWindow::default()).await.unwrap();
    assert!(before[0].fulfills_link_confirmed);

    submit(
        &resolver,
        X,
        json!({"@type": "Offer", "identifier": o, "includesObject": hur(4)}),
    )
    .await;

    let after = resolver.gives(Some(&g), QueryWindow::default()).await.unwrap();
    assert!(!after[0].fulfills_link_confirmed);
    assert_eq!(after[0].fulfills_last_claim_id, Some(offer.sequence_id));

    let fulfillers = resolver.give_fulfillers_to_offer(&o).await.unwrap();
    assert_eq!(fulfillers.len(), 1);
    assert!(!fulfillers[0].fulfills_link_confirmed);
}

#[tokio::test]
async fn plan_give_totals_sum_by_unit() {
    let resolver = LinkageResolver::in_memory();
    let h = handle(&plan(&resolver, X, "Trail cleanup").await);
    give_to_plan(&resolver, Y, &h, 2).await;
    give_to_plan(&resolver, Z, &h, 1).await;

    let given = resolver
        .give_totals(None, &TotalsRequest::for_plan(&h))
        .await
        .unwrap();
    assert_eq!(given, totals(&[("HUR", 3.0)]));
}

#[tokio::test]
async fn gives_through_an_offer_count_once() {
    let resolver = LinkageResolver::in_memory();
    let h = handle(&plan(&resolver, X, "Library").await);
    let offer = submit(
        &resolver,
        Y,
        json!({
            "@type": "Offer",
            "includesObject": hur(5),
            "itemOffered": {"isPartOf": {"identifier": h}}
        }),
    )
    .await;
    let o = handle(&offer);

    // linked to both the offer and the plan
    submit(
        &resolver,
        Y,
        json!({
            "@type": "GiveAction",
            "fulfills": [
                {"@type": "Offer", "identifier": o},
                {"@type": "PlanAction", "identifier": h}
            ],
            "object": hur(4)
        }),
    )
    .await;
    give_to_plan(&resolver, Z, &h, 1).await;

    let given = resolver
        .give_totals(None, &TotalsRequest::for_plan(&h))
        .await
        .unwrap();
    assert_eq!(given, totals(&[("HUR", 5.0)]));
    assert_eq!(resolver.gives_to_plan(&h).await.unwrap().len(), 2);
}

#[tokio::test]
async fn foreign_issuer_cannot_supersede() {
    let resolver = LinkageResolver::in_memory();
    let plan = plan(&resolver, X, "Original").await;
    let h = handle(&plan);

    let err = resolver
        .submit(VerifiedClaim::new(
            Y,
            json!({"@type": "PlanAction", "identifier": h, "name": "Hijacked"}),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkageError::Conflict(ConflictKind::ForeignIssuer { .. })
    ));

    let current = resolver.current_version(&h).await.unwrap();
    assert_eq!(current.sequence_id, plan.sequence_id);
    assert_eq!(current.payload["name"], "Original");

    // the attempt is in the audit log but not applied
    let log = resolver
        .log()
        .range(SequenceId::FIRST, None)
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert!(!log[1].is_applied());
    assert!(log[1].handle_id.is_none());
}

#[tokio::test]
async fn confirmations_count_one_level_deep() {
    let resolver = LinkageResolver::in_memory();
    let attended = json!({"@type": "JoinAction", "agent": {"identifier": X}, "event": {"name": "Town hall"}});
    let claim = submit(&resolver, X, attended.clone()).await;

    let by_content = submit(
        &resolver,
        Y,
        json!({"@type": "AgreeAction", "object": attended}),
    )
    .await;
    assert_eq!(by_content.confirmations.len(), 1);
    assert_eq!(by_content.confirmations[0].target_sequence_id, claim.sequence_id);
    assert!(by_content.confirmations[0].counted);

    let of_confirmation = submit(
        &resolver,
        Z,
        json!({"@type": "AgreeAction", "object": {"lastClaimId": by_content.sequence_id.to_string()}}),
    )
    .await;
    assert!(!of_confirmation.confirmations[0].counted);

    let repeat = submit(
        &resolver,
        Y,
        json!({"@type": "AgreeAction", "object": [{"lastClaimId": claim.sequence_id.value()}]}),
    )
    .await;
    assert!(!repeat.confirmations[0].counted);

    let on_claim = resolver.confirmations_of(claim.sequence_id).await.unwrap();
    assert_eq!(on_claim.len(), 2);
    assert_eq!(on_claim.iter().filter(|c| c.counted).count(), 1);
    assert!(on_claim.iter().all(|c| c.confirmer == Y));

    let on_confirmation = resolver
        .confirmations_of(by_content.sequence_id)
        .await
        .unwrap();
    assert_eq!(on_confirmation.len(), 1);
    assert!(!on_confirmation[0].counted);
}

#[tokio::test]
async fn confirmations_match_claims_embedded_without_context() {
    let resolver = LinkageResolver::in_memory();
    let attended = json!({
        "@context": "https://schema.org",
        "@type": "JoinAction",
        "agent": {"identifier": X},
        "event": {"organizer": {"name": "Library"}, "name": "Book club"}
    });
    let claim = submit(&resolver, X, attended).await;

    let receipt = submit(
        &resolver,
        Y,
        json!({
            "@context": "https://schema.org",
            "@type": "AgreeAction",
            "object": {
                "@type": "JoinAction",
                "agent": {"identifier": X},
                "event": {"name": "Book club", "organizer": {"name": "Library"}}
            }
        }),
    )
    .await;
    assert!(receipt.warnings.is_empty());
    assert_eq!(receipt.confirmations.len(), 1);
    assert_eq!(receipt.confirmations[0].target_sequence_id, claim.sequence_id);

    let confirmations = resolver.confirmations_of(claim.sequence_id).await.unwrap();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].confirmer, Y);
}

#[tokio::test]
async fn unmatched_confirmation_targets_warn() {
    let resolver = LinkageResolver::in_memory();
    let receipt = submit(
        &resolver,
        Y,
        json!({"@type": "AgreeAction", "object": {"@type": "JoinAction", "event": {"name": "never"}}}),
    )
    .await;
    assert!(receipt.confirmations.is_empty());
    assert_eq!(receipt.warnings.len(), 1);
}

#[tokio::test]
async fn trades_are_excluded_unless_requested() {
    let resolver = LinkageResolver::in_memory();
    let h = handle(&plan(&resolver, X, "Market").await);
    give_to_plan(&resolver, Y, &h, 2).await;
    submit(
        &resolver,
        X,
        json!({
            "@type": "GiveAction",
            "fulfills": {"@type": "TradeAction", "isPartOf": {"identifier": h}},
            "recipient": {"identifier": X},
            "object": {"amountOfThisGood": 3, "unitCode": "USD"},
            "description": "Trading the ginger chews"
        }),
    )
    .await;

    let default = resolver
        .give_totals(None, &TotalsRequest::for_plan(&h))
        .await
        .unwrap();
    assert_eq!(default, totals(&[("HUR", 2.0)]));

    let with_trades = resolver
        .give_totals(None, &TotalsRequest::for_plan(&h).with_trades())
        .await
        .unwrap();
    assert_eq!(with_trades, totals(&[("HUR", 2.0), ("USD", 3.0)]));
}

#[tokio::test]
async fn totals_require_one_scope_and_the_right_requester() {
    let resolver = LinkageResolver::in_memory();
    submit(
        &resolver,
        X,
        json!({"@type": "GiveAction", "recipient": {"identifier": Y}, "object": hur(4)}),
    )
    .await;

    let neither = resolver
        .give_totals(Some(Y), &TotalsRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(neither, LinkageError::Validation(_)));

    let mut both = TotalsRequest::for_plan("https://endorser.ch/entity/claim-1");
    both.recipient_id = Some(Y.to_string());
    assert!(matches!(
        resolver.offer_totals(Some(Y), &both).await.unwrap_err(),
        LinkageError::Validation(_)
    ));

    let someone_else = resolver
        .give_totals(Some(X), &TotalsRequest::for_recipient(Y))
        .await
        .unwrap_err();
    assert!(matches!(someone_else, LinkageError::Validation(_)));

    let own = resolver
        .give_totals(Some(Y), &TotalsRequest::for_recipient(Y))
        .await
        .unwrap();
    assert_eq!(own, totals(&[("HUR", 4.0)]));
}

#[tokio::test]
async fn only_the_recipient_confirms_a_give() {
    let resolver = LinkageResolver::in_memory();
    let give = submit(
        &resolver,
        Y,
        json!({"@type": "GiveAction", "recipient": {"identifier": Z}, "object": hur(2)}),
    )
    .await;
    let g = handle(&give);
    let confirm = json!({"@type": "AgreeAction", "object": {"@type": "GiveAction", "identifier": g}});

    submit(&resolver, X, confirm.clone()).await;
    let view = resolver.gives(Some(&g), QueryWindow::default()).await.unwrap();
    assert_eq!(view[0].amount_confirmed, 0.0);

    submit(&resolver, Z, confirm).await;
    let view = resolver.gives(Some(&g), QueryWindow::default()).await.unwrap();
    assert_eq!(view[0].amount_confirmed, 2.0);

    let own = submit(
        &resolver,
        Z,
        json!({"@type": "GiveAction", "recipient": {"identifier": Z}, "object": hur(1)}),
    )
    .await;
    let view = resolver
        .gives(Some(&handle(&own)), QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(view[0].amount_confirmed, 1.0);

    let confirmed_only = resolver
        .give_totals(Some(Z), &TotalsRequest::for_recipient(Z).confirmed())
        .await
        .unwrap();
    assert_eq!(confirmed_only, totals(&[("HUR", 3.0)]));
}

#[tokio::test]
async fn offer_tallies_confirmed_and_amountless_gives() {
    let resolver = LinkageResolver::in_memory();
    let offer = submit(
        &resolver,
        X,
        json!({"@type": "Offer", "includesObject": hur(3), "recipient": {"identifier": Z}}),
    )
    .await;
    let o = handle(&offer);
    let fulfills = json!({"@type": "Offer", "identifier": o});

    submit(
        &resolver,
        Y,
        json!({"@type": "GiveAction", "fulfills": fulfills.clone(), "object": hur(2)}),
    )
    .await;
    submit(
        &resolver,
        Z,
        json!({"@type": "GiveAction", "fulfills": fulfills, "description": "moral support"}),
    )
    .await;

    let view = resolver.offers(Some(&o), QueryWindow::default()).await.unwrap();
    assert_eq!(view[0].amount, Some(3.0));
    assert_eq!(view[0].unit.as_deref(), Some("HUR"));
    assert_eq!(view[0].amount_given, 2.0);
    assert_eq!(view[0].amount_given_confirmed, 0.0);
    // issued by the offer's recipient, so already confirmed
    assert_eq!(view[0].non_amount_given_confirmed, 1);
}

#[tokio::test]
async fn dropping_fulfills_detaches_the_give() {
    let resolver = LinkageResolver::in_memory();
    let o = handle(&submit(&resolver, X, json!({"@type": "Offer", "name": "Materials"})).await);
    let first = submit(
        &resolver,
        Y,
        json!({"@type": "GiveAction", "fulfills": {"identifier": o}, "description": "first"}),
    )
    .await;
    submit(
        &resolver,
        Z,
        json!({"@type": "GiveAction", "fulfills": {"identifier": o}, "description": "second"}),
    )
    .await;

    let fulfillers = resolver.give_fulfillers_to_offer(&o).await.unwrap();
    assert_eq!(
        fulfillers
            .iter()
            .map(|f| f.full_claim["description"].as_str().unwrap())
            .collect::<Vec<_>>(),
        vec!["second", "first"]
    );

    submit(
        &resolver,
        Y,
        json!({"@type": "GiveAction", "identifier": handle(&first), "description": "first, unlinked"}),
    )
    .await;
    let fulfillers = resolver.give_fulfillers_to_offer(&o).await.unwrap();
    assert_eq!(fulfillers.len(), 1);
    assert_eq!(fulfillers[0].full_claim["description"], "second");
}

#[tokio::test]
async fn gives_can_fulfill_gives() {
    let resolver = LinkageResolver::in_memory();
    let first = submit(&resolver, X, json!({"@type": "GiveAction", "object": hur(1)})).await;
    let g1 = handle(&first);
    let second = submit(
        &resolver,
        Y,
        json!({
            "@type": "GiveAction",
            "fulfills": {"@type": "GiveAction", "identifier": g1, "lastClaimId": first.sequence_id.value()},
            "description": "Found new friends"
        }),
    )
    .await;

    let view = resolver
        .gives(Some(&handle(&second)), QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(view[0].fulfills_type.as_deref(), Some("GiveAction"));
    assert!(view[0].fulfills_link_confirmed);
    assert!(view[0].fulfills_plan_handle_id.is_none());

    let fulfillers = resolver.give_fulfillers_to_give(&g1).await.unwrap();
    assert_eq!(fulfillers.len(), 1);
    assert!(fulfillers[0].fulfills_link_confirmed);
}

#[tokio::test]
async fn providers_are_listed_both_ways() {
    let resolver = LinkageResolver::in_memory();
    let h = handle(&plan(&resolver, X, "Workshop").await);
    let give = submit(
        &resolver,
        Y,
        json!({
            "@type": "GiveAction",
            "provider": [
                {"@type": "Person", "identifier": Z},
                {"@type": "PlanAction", "identifier": h}
            ],
            "object": hur(2)
        }),
    )
    .await;
    submit(&resolver, Y, json!({"@type": "GiveAction", "object": hur(7)})).await;

    let providers = resolver.providers_to_give(&handle(&give)).await.unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[0].identifier, Z);
    assert_eq!(providers[1].provider_type.as_deref(), Some("PlanAction"));

    let by_person = resolver
        .gives_provided_by(Z, QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(by_person.len(), 1);
    let by_plan = resolver
        .gives_provided_by(&h, QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(by_plan.len(), 1);
    assert_eq!(by_plan[0].handle_id, give.handle_id.clone().unwrap());

    assert!(matches!(
        resolver
            .providers_to_give("https://example.org/unknown")
            .await
            .unwrap_err(),
        LinkageError::NotFound(_)
    ));
}

#[tokio::test]
async fn plans_fulfill_plans() {
    let resolver = LinkageResolver::in_memory();
    let parent = plan(&resolver, X, "Parent").await;
    let p = handle(&parent);
    let child = submit(
        &resolver,
        Y,
        json!({
            "@type": "Project",
            "name": "Child",
            "fulfills": {"@type": "PlanAction", "identifier": p, "lastClaimId": parent.sequence_id.to_string()}
        }),
    )
    .await;
    let c = handle(&child);

    let children = resolver.plan_fulfillers_to_plan(&p).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].handle_id.as_str(), c);

    let view = resolver.plans(Some(&c), QueryWindow::default()).await.unwrap();
    assert_eq!(view[0].fulfills_plan_handle_id.as_ref().unwrap().as_str(), p);
    assert!(view[0].fulfills_link_confirmed);

    let fulfilled = resolver.plan_fulfilled_by_plan(&c).await.unwrap().unwrap();
    assert_eq!(fulfilled.plan.name.as_deref(), Some("Parent"));
    assert!(fulfilled.child_fulfills_link_confirmed);
    assert!(resolver.plan_fulfilled_by_plan(&p).await.unwrap().is_none());

    // bare local suffixes work for lookups
    let suffix = p.trim_start_matches(resolver.namespace().prefix());
    assert_eq!(
        resolver.plans(Some(suffix), QueryWindow::default()).await.unwrap().len(),
        1
    );
    let all = resolver.plans(None, QueryWindow::first(1)).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].handle_id.as_str(), c);
}

#[tokio::test]
async fn parent_issuer_confirmation_confirms_a_plan_link() {
    let resolver = LinkageResolver::in_memory();
    let parent = plan(&resolver, X, "Parent").await;
    let p = handle(&parent);
    let child = submit(
        &resolver,
        Y,
        json!({
            "@type": "PlanAction",
            "name": "Child",
            "fulfills": {"@type": "PlanAction", "identifier": p}
        }),
    )
    .await;
    let c = handle(&child);

    let before = resolver.plan_fulfilled_by_plan(&c).await.unwrap().unwrap();
    assert!(!before.child_fulfills_link_confirmed);
    assert!(!resolver.plan_fulfillers_to_plan(&p).await.unwrap()[0].fulfills_link_confirmed);

    // someone other than the parent's issuer confirming changes nothing
    submit(
        &resolver,
        Z,
        json!({"@type": "AgreeAction", "object": {"@type": "PlanAction", "identifier": c}}),
    )
    .await;
    assert!(!resolver
        .plan_fulfilled_by_plan(&c)
        .await
        .unwrap()
        .unwrap()
        .child_fulfills_link_confirmed);

    let agree = submit(
        &resolver,
        X,
        json!({
            "@type": "AgreeAction",
            "object": [{"@type": "PlanAction", "identifier": c, "name": "Child"}]
        }),
    )
    .await;
    assert_eq!(agree.confirmations[0].target_sequence_id, child.sequence_id);

    let after = resolver.plan_fulfilled_by_plan(&c).await.unwrap().unwrap();
    assert!(after.child_fulfills_link_confirmed);
    assert_eq!(after.plan.handle_id.as_str(), p);
    let fulfillers = resolver.plan_fulfillers_to_plan(&p).await.unwrap();
    assert_eq!(fulfillers.len(), 1);
    assert!(fulfillers[0].fulfills_link_confirmed);

    // a new child version needs its own confirmation
    submit(
        &resolver,
        Y,
        json!({
            "@type": "PlanAction",
            "identifier": c,
            "name": "Child, revised",
            "fulfills": {"@type": "PlanAction", "identifier": p}
        }),
    )
    .await;
    assert!(!resolver
        .plan_fulfilled_by_plan(&c)
        .await
        .unwrap()
        .unwrap()
        .child_fulfills_link_confirmed);
}

#[tokio::test]
async fn gives_are_listed_across_several_plans() {
    let resolver = LinkageResolver::in_memory();
    let first = handle(&plan(&resolver, X, "First").await);
    let second = handle(&plan(&resolver, Y, "Second").await);
    let to_first = give_to_plan(&resolver, Y, &first, 1).await;
    let to_second = give_to_plan(&resolver, X, &second, 2).await;
    let to_both = submit(
        &resolver,
        Z,
        json!({
            "@type": "GiveAction",
            "fulfills": [
                {"@type": "PlanAction", "identifier": first},
                {"@type": "PlanAction", "identifier": second}
            ],
            "object": hur(3)
        }),
    )
    .await;

    let gives = resolver
        .gives_to_plans(&[first.as_str(), second.as_str()])
        .await
        .unwrap();
    assert_eq!(
        gives.iter().map(|g| g.current_sequence_id).collect::<Vec<_>>(),
        vec![to_both.sequence_id, to_second.sequence_id, to_first.sequence_id]
    );
    assert!(gives.iter().all(|g| g.amount_confirmed == 0.0));

    assert_eq!(resolver.gives_to_plans(&[second.as_str()]).await.unwrap().len(), 2);
    assert!(resolver.gives_to_plans(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn plans_by_issuer_page_backwards() {
    let resolver = LinkageResolver::in_memory();
    let first = plan(&resolver, X, "First").await;
    let second = plan(&resolver, X, "Second").await;
    plan(&resolver, Y, "Elsewhere").await;

    let mine = resolver
        .plans_by_issuer(X, None, QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(
        mine.iter().map(|p| p.current_sequence_id).collect::<Vec<_>>(),
        vec![second.sequence_id, first.sequence_id]
    );

    let older = resolver
        .plans_by_issuer(X, Some(second.sequence_id), QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].name.as_deref(), Some("First"));

    let theirs = resolver
        .plans_by_issuer(Y, None, QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(theirs.len(), 1);
    assert!(resolver
        .plans_by_issuer(Z, None, QueryWindow::default())
        .await
        .unwrap()
        .is_empty());
}
