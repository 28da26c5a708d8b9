use chrono::{DateTime, Duration, Utc};
use clap::Args;
use nexus_polls::auth::UserId;
use nexus_polls::error::AppError;
use nexus_polls::polls::{
    ChoiceDraft, InMemoryPollStore, PollRepository, PollResults, PollService, PollServiceError,
    PollSubmission, VoteRequest,
};
use nexus_polls::validation::ValidationFailure;
use std::sync::Arc;

pub(crate) const MAX_OPEN_DAYS: i64 = 3650;

pub(crate) const DEMO_QUESTION: &str = "Which feature should we build next?";
pub(crate) const DEMO_CHOICES: [&str; 3] = ["Dark mode", "Offline sync", "Poll templates"];

#[derive(Args, Debug)]
pub(crate) struct SeedDemoArgs {
    /// Number of simulated voters
    #[arg(long, default_value_t = 7)]
    pub(crate) voters: u64,
    /// Keep the poll open for this many days, 1 to 3650 (omit for no end date)
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_OPEN_DAYS))]
    pub(crate) open_days: Option<i64>,
    /// Print the final results as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn seed_demo_poll<R>(
    service: &PollService<R>,
    open_days: Option<i64>,
) -> Result<PollResults, PollServiceError>
where
    R: PollRepository + 'static,
{
    let end_date = match open_days {
        Some(days) => Some(closing_date(days)?),
        None => None,
    };

    service.create_poll(PollSubmission {
        question: DEMO_QUESTION.to_string(),
        end_date,
        choices: DEMO_CHOICES
            .iter()
            .map(|text| ChoiceDraft {
                choice_text: text.to_string(),
            })
            .collect(),
    })
}

fn closing_date(days: i64) -> Result<DateTime<Utc>, ValidationFailure> {
    Duration::try_days(days)
        .filter(|_| (1..=MAX_OPEN_DAYS).contains(&days))
        .and_then(|span| Utc::now().checked_add_signed(span))
        .ok_or_else(|| {
            ValidationFailure::field(
                "end_date",
                format!("The poll must stay open between 1 and {MAX_OPEN_DAYS} days."),
            )
        })
}

pub(crate) fn run_seed_demo(args: SeedDemoArgs) -> Result<(), AppError> {
    let SeedDemoArgs {
        voters,
        open_days,
        json,
    } = args;

    let service = PollService::new(Arc::new(InMemoryPollStore::default()));
    let poll = seed_demo_poll(&service, open_days)?;

    println!("Poll #{}: {}", poll.id, poll.question);
    for voter in 1..=voters {
        // Uneven on purpose: indexes past the last choice land on it.
        let choice = &poll.choices[(voter as usize % 4).min(poll.choices.len() - 1)];
        let vote = service.cast_vote(UserId(voter), poll.id, &VoteRequest::for_choice(choice.id))?;
        println!("- voter {} chose {:?} (vote #{})", voter, choice.choice_text, vote.id);
    }

    if let Some(first) = poll.choices.first() {
        match service.cast_vote(UserId(1), poll.id, &VoteRequest::for_choice(first.id)) {
            Ok(vote) => println!("- voter 1 voted again (vote #{})", vote.id),
            Err(err) => println!("- voter 1 tried again: {}", err),
        }
    }

    let results = service.results(poll.id)?;
    if json {
        match serde_json::to_string_pretty(&results) {
            Ok(body) => println!("{}", body),
            Err(err) => println!("Results unavailable: {}", err),
        }
        return Ok(());
    }

    render_results(&results);
    Ok(())
}

pub(crate) fn render_results(results: &PollResults) {
    let total = results.total_votes();
    println!("\nResults ({} votes)", total);
    for choice in &results.choices {
        let share = if total == 0 {
            0.0
        } else {
            choice.votes_count as f64 / total as f64 * 100.0
        };
        println!(
            "  {:<16} {:>3} | {:>5.1}%",
            choice.choice_text, choice.votes_count, share
        );
    }
    match results.end_date {
        Some(end) => println!("Voting closes {}", end.format("%Y-%m-%d %H:%M UTC")),
        None => println!("Voting stays open until the poll is deleted"),
    }
}
