use std::sync::Arc;

use chrono::Utc;

use super::common::*;
use crate::auth::UserId;
use crate::polls::domain::VoteRequest;
use crate::polls::repository::PollRepository;
use crate::polls::results::tally;

#[test]
fn counts_reflect_recorded_votes() {
    let (store, service) = store_and_service();
    let poll = seed_poll(&service, "Best editor?", &["A", "B", "C"]);
    let a = VoteRequest::for_choice(choice_id(&poll, "A"));
    let b = VoteRequest::for_choice(choice_id(&poll, "B"));

    service.cast_vote(UserId(1), poll.id, &a).unwrap();
    service.cast_vote(UserId(2), poll.id, &a).unwrap();
    service.cast_vote(UserId(3), poll.id, &b).unwrap();

    let results = service.results(poll.id).expect("results");
    assert_eq!(results.count_for("A"), Some(2));
    assert_eq!(results.count_for("B"), Some(1));
    assert_eq!(results.count_for("C"), Some(0));
    assert_eq!(results.total_votes(), 3);
    assert_eq!(results.total_votes() as usize, store.vote_total().unwrap());
}

#[test]
fn tally_lists_choices_in_creation_order() {
    let (store, service) = store_and_service();
    let poll = seed_poll(&service, "Order?", &["first", "second", "third"]);

    let stored = store.fetch_poll(poll.id).unwrap().expect("poll stored");
    let results = tally(&store, stored).expect("tally");

    let texts: Vec<_> = results
        .choices
        .iter()
        .map(|choice| choice.choice_text.as_str())
        .collect();
    assert_eq!(texts, ["first", "second", "third"]);
}

#[test]
fn results_are_read_at_call_time() {
    let (_store, service) = store_and_service();
    let poll = seed_poll(&service, "Live?", &["yes", "no"]);
    assert_eq!(service.results(poll.id).unwrap().total_votes(), 0);

    service
        .cast_vote_at(
            UserId(9),
            poll.id,
            &VoteRequest::for_choice(choice_id(&poll, "yes")),
            Utc::now(),
        )
        .unwrap();
    assert_eq!(service.results(poll.id).unwrap().count_for("yes"), Some(1));

    service.delete_choice(choice_id(&poll, "yes")).unwrap();
    let results = service.results(poll.id).unwrap();
    assert_eq!(results.count_for("yes"), None);
    assert_eq!(results.total_votes(), 0);
}

#[test]
fn results_for_other_polls_are_isolated() {
    let repository = Arc::new(CountingRepository::default());
    let service = crate::polls::PollService::new(repository.clone());
    let first = seed_poll(&service, "One?", &["x"]);
    let second = seed_poll(&service, "Two?", &["y"]);

    service
        .cast_vote(
            UserId(1),
            first.id,
            &VoteRequest::for_choice(choice_id(&first, "x")),
        )
        .unwrap();

    assert_eq!(service.results(second.id).unwrap().total_votes(), 0);
    assert_eq!(service.results(first.id).unwrap().total_votes(), 1);
}

#[test]
fn tally_reads_choices_and_counts_in_one_call() {
    let repository = Arc::new(CountingRepository::default());
    let service = crate::polls::PollService::new(repository.clone());
    let poll = seed_poll(&service, "Snapshot?", &["x", "y"]);
    service
        .cast_vote(
            UserId(4),
            poll.id,
            &VoteRequest::for_choice(choice_id(&poll, "y")),
        )
        .unwrap();

    let stored = repository.inner.fetch_poll(poll.id).unwrap().expect("poll stored");
    let calls_before = repository.calls();
    let results = tally(repository.as_ref(), stored).expect("tally");

    assert_eq!(repository.calls() - calls_before, 1);
    assert_eq!(results.count_for("x"), Some(0));
    assert_eq!(results.count_for("y"), Some(1));
}
