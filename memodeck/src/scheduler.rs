//! The spaced-repetition state machine. `advance` is a pure function of the
//! card, the rating, the deck configuration, and the clock readings; the
//! caller applies the outcome and the matching revlog row in one transaction.
//!
//! The transition semantics intentionally deviate from textbook SM-2 in a few
//! places (step repetition on Hard, interval reset on lapse with `mult = 0`).
//! Collections are shared with stock Anki clients, so these exact values are
//! part of the on-disk contract.

use crate::collection::blobs::DeckConfEntry;
use crate::model::{Card, CardQueue, CardType, ReviewOutcome, RevlogEntry};
use crate::{Error, LibraryError, SchedulerErrorKind};

/// Minimum ease factor (×1000) a review card can reach.
pub const MIN_FACTOR: i64 = 1300;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Ease {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl TryFrom<u8> for Ease {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            1 => Ok(Ease::Again),
            2 => Ok(Ease::Hard),
            3 => Ok(Ease::Good),
            4 => Ok(Ease::Easy),
            other => Err(Error::Library(LibraryError::Scheduler(
                SchedulerErrorKind::InvalidEase(other),
            ))),
        }
    }
}

pub fn advance(
    card: &Card,
    ease: Ease,
    conf: &DeckConfEntry,
    now_ms: i64,
    day_cutoff: i64,
) -> ReviewOutcome {
    match card.kind {
        CardType::New | CardType::Learning => learning_step(card, ease, conf, now_ms, day_cutoff),
        CardType::Review => review_step(card, ease, conf, now_ms, day_cutoff),
        CardType::Relearning => relearning_step(card, ease, conf, now_ms, day_cutoff),
    }
}

/// The revlog row describing `outcome`. `id` must be a fresh monotonic
/// timestamp id allocated by the caller.
pub fn revlog_entry(
    id: i64,
    card: &Card,
    outcome: &ReviewOutcome,
    ease: Ease,
    time_taken_ms: i64,
) -> RevlogEntry {
    RevlogEntry {
        id,
        cid: card.id,
        usn: -1,
        ease: ease as i64,
        ivl: outcome.ivl,
        last_ivl: card.ivl,
        factor: outcome.factor,
        time: time_taken_ms,
        kind: match card.kind {
            CardType::New | CardType::Learning => 0,
            CardType::Review => 1,
            CardType::Relearning => 2,
        },
    }
}

/// `left` packs today-remaining and total-remaining step counts; with steps
/// always completable the day they fire, both halves carry the same number.
fn encode_left(remaining: usize) -> i64 {
    let r = remaining as i64;
    r * 1000 + r
}

/// Steps still ahead of the card. Zero (a new card) or a stale value from an
/// older configuration means the full ladder.
fn remaining_steps(left: i64, total: usize) -> usize {
    let r = (left % 1000) as usize;
    if r == 0 || r > total { total } else { r }
}

fn delay_secs(delays: &[f64], index: usize) -> i64 {
    let minutes = delays.get(index).copied().unwrap_or(1.0);
    (minutes * 60.0) as i64
}

fn learning_step(
    card: &Card,
    ease: Ease,
    conf: &DeckConfEntry,
    now_ms: i64,
    day_cutoff: i64,
) -> ReviewOutcome {
    let delays = &conf.new.delays;
    let total = delays.len().max(1);
    let remaining = remaining_steps(card.left, total);
    let now_secs = now_ms / 1000;
    let graduate = |interval_days: i64| ReviewOutcome {
        kind: CardType::Review,
        queue: CardQueue::Review,
        due: day_cutoff + interval_days,
        ivl: interval_days,
        factor: conf.new.initial_factor,
        left: 0,
        lapses_delta: 0,
    };
    let step = |remaining: usize| {
        let delay = delay_secs(delays, total - remaining);
        ReviewOutcome {
            kind: CardType::Learning,
            queue: CardQueue::Learning,
            due: now_secs + delay,
            ivl: delay,
            factor: card.factor,
            left: encode_left(remaining),
            lapses_delta: 0,
        }
    };
    match ease {
        Ease::Again => step(total),
        Ease::Hard => step(remaining),
        Ease::Good => {
            if remaining <= 1 {
                graduate(conf.new.ints.first().copied().unwrap_or(1))
            } else {
                step(remaining - 1)
            }
        }
        Ease::Easy => graduate(conf.new.ints.get(1).copied().unwrap_or(4)),
    }
}

fn review_step(
    card: &Card,
    ease: Ease,
    conf: &DeckConfEntry,
    now_ms: i64,
    day_cutoff: i64,
) -> ReviewOutcome {
    let now_secs = now_ms / 1000;
    let grown = |multiplier: f64| {
        let raw = (card.ivl as f64 * multiplier * conf.rev.ivl_fct) as i64;
        raw.max(card.ivl + 1).min(conf.rev.max_ivl.max(1))
    };
    let review = |ivl: i64, factor: i64| ReviewOutcome {
        kind: CardType::Review,
        queue: CardQueue::Review,
        due: day_cutoff + ivl,
        ivl,
        factor,
        left: 0,
        lapses_delta: 0,
    };
    match ease {
        Ease::Again => {
            let delays = &conf.lapse.delays;
            ReviewOutcome {
                kind: CardType::Relearning,
                queue: CardQueue::Learning,
                due: now_secs + delay_secs(delays, 0),
                // The pre-lapse interval rides along so relearning
                // graduation can apply `lapse.mult` to it.
                ivl: card.ivl,
                factor: (card.factor - 200).max(MIN_FACTOR),
                left: encode_left(delays.len().max(1)),
                lapses_delta: 1,
            }
        }
        Ease::Hard => review(grown(conf.rev.hard_factor), (card.factor - 150).max(MIN_FACTOR)),
        Ease::Good => review(grown(card.factor as f64 / 1000.0), card.factor),
        Ease::Easy => review(
            grown(card.factor as f64 / 1000.0 * conf.rev.ease4),
            card.factor + 150,
        ),
    }
}

fn relearning_step(
    card: &Card,
    ease: Ease,
    conf: &DeckConfEntry,
    now_ms: i64,
    day_cutoff: i64,
) -> ReviewOutcome {
    let delays = &conf.lapse.delays;
    let total = delays.len().max(1);
    let remaining = remaining_steps(card.left, total);
    let now_secs = now_ms / 1000;
    let graduate = || {
        let interval_days = if conf.lapse.mult > 0.0 {
            ((card.ivl as f64 * conf.lapse.mult) as i64).max(conf.lapse.min_int)
        } else {
            conf.lapse.min_int
        };
        ReviewOutcome {
            kind: CardType::Review,
            queue: CardQueue::Review,
            due: day_cutoff + interval_days,
            ivl: interval_days,
            factor: card.factor,
            left: 0,
            lapses_delta: 0,
        }
    };
    let step = |remaining: usize| {
        let delay = delay_secs(delays, total - remaining);
        ReviewOutcome {
            kind: CardType::Relearning,
            queue: CardQueue::Learning,
            due: now_secs + delay,
            ivl: card.ivl,
            factor: card.factor,
            left: encode_left(remaining),
            lapses_delta: 0,
        }
    };
    match ease {
        Ease::Again => step(total),
        Ease::Hard => step(remaining),
        Ease::Good => {
            if remaining <= 1 {
                graduate()
            } else {
                step(remaining - 1)
            }
        }
        Ease::Easy => graduate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOW_MS: i64 = 1_700_000_000_000;
    const NOW_SECS: i64 = NOW_MS / 1000;
    const CUTOFF: i64 = 120;

    fn conf() -> DeckConfEntry {
        DeckConfEntry::initial()
    }

    fn card(kind: CardType, queue: CardQueue, ivl: i64, factor: i64, left: i64) -> Card {
        Card {
            id: 1,
            nid: 1,
            did: 1,
            ord: 0,
            mtime_secs: 0,
            usn: -1,
            kind,
            queue,
            due: 0,
            ivl,
            factor,
            reps: 0,
            lapses: 0,
            left,
            odue: 0,
            odid: 0,
            flags: 0,
            data: String::new(),
        }
    }

    fn new_card() -> Card {
        card(CardType::New, CardQueue::New, 0, 0, 0)
    }

    fn review_card(ivl: i64, factor: i64) -> Card {
        card(CardType::Review, CardQueue::Review, ivl, factor, 0)
    }

    #[test]
    fn ease_parsing_bounds() {
        assert!(Ease::try_from(0).is_err());
        assert!(Ease::try_from(5).is_err());
        assert_eq!(Ease::try_from(3).unwrap(), Ease::Good);
    }

    #[test]
    fn new_card_again_resets_to_first_step() {
        let outcome = advance(&new_card(), Ease::Again, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Learning);
        assert_eq!(outcome.queue, CardQueue::Learning);
        assert_eq!(outcome.due, NOW_SECS + 60);
        assert_eq!(outcome.ivl, 60);
        assert_eq!(outcome.left, 2002);
    }

    #[test]
    fn new_card_good_advances_one_step() {
        let outcome = advance(&new_card(), Ease::Good, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Learning);
        assert_eq!(outcome.due, NOW_SECS + 600);
        assert_eq!(outcome.left, 1001);
    }

    #[test]
    fn hard_repeats_the_current_step_delay() {
        // One step left on a [1, 10] ladder: the current step is the 10
        // minute one, and Hard repeats exactly that delay.
        let learning = card(CardType::Learning, CardQueue::Learning, 600, 0, 1001);
        let outcome = advance(&learning, Ease::Hard, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.due, NOW_SECS + 600);
        assert_eq!(outcome.left, 1001);
        assert_eq!(outcome.kind, CardType::Learning);
    }

    #[test]
    fn last_step_good_graduates() {
        let learning = card(CardType::Learning, CardQueue::Learning, 600, 0, 1001);
        let outcome = advance(&learning, Ease::Good, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Review);
        assert_eq!(outcome.queue, CardQueue::Review);
        assert_eq!(outcome.ivl, 1);
        assert_eq!(outcome.due, CUTOFF + 1);
        assert_eq!(outcome.factor, 2500);
        assert_eq!(outcome.left, 0);
    }

    #[test]
    fn easy_graduates_immediately_with_bonus_interval() {
        let outcome = advance(&new_card(), Ease::Easy, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Review);
        assert_eq!(outcome.ivl, 4);
        assert_eq!(outcome.due, CUTOFF + 4);
        assert_eq!(outcome.factor, 2500);
    }

    #[test]
    fn review_lapse_enters_relearning() {
        let outcome = advance(&review_card(10, 2500), Ease::Again, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Relearning);
        assert_eq!(outcome.queue, CardQueue::Learning);
        assert_eq!(outcome.due, NOW_SECS + 600);
        assert_eq!(outcome.factor, 2300);
        assert_eq!(outcome.lapses_delta, 1);
        // Pre-lapse interval is preserved for the relearning graduation.
        assert_eq!(outcome.ivl, 10);

        let log = revlog_entry(NOW_MS, &review_card(10, 2500), &outcome, Ease::Again, 2_500);
        assert_eq!(log.ease, 1);
        assert_eq!(log.last_ivl, 10);
        assert_eq!(log.kind, 1);
    }

    #[test]
    fn review_growth_is_ordered_by_ease() {
        let base = review_card(10, 2500);
        let hard = advance(&base, Ease::Hard, &conf(), NOW_MS, CUTOFF);
        let good = advance(&base, Ease::Good, &conf(), NOW_MS, CUTOFF);
        let easy = advance(&base, Ease::Easy, &conf(), NOW_MS, CUTOFF);

        assert_eq!(hard.ivl, 12);
        assert_eq!(good.ivl, 25);
        assert_eq!(easy.ivl, 32);
        assert!(hard.ivl <= good.ivl && good.ivl <= easy.ivl);

        assert_eq!(hard.factor, 2350);
        assert_eq!(good.factor, 2500);
        assert_eq!(easy.factor, 2650);
        assert_eq!(good.due, CUTOFF + 25);
    }

    #[test]
    fn review_interval_always_grows_by_at_least_one_day() {
        let outcome = advance(&review_card(1, 1300), Ease::Hard, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.ivl, 2);
    }

    #[test]
    fn factor_never_drops_below_floor() {
        let hard = advance(&review_card(10, 1300), Ease::Hard, &conf(), NOW_MS, CUTOFF);
        assert_eq!(hard.factor, MIN_FACTOR);
        let lapse = advance(&review_card(10, 1350), Ease::Again, &conf(), NOW_MS, CUTOFF);
        assert_eq!(lapse.factor, MIN_FACTOR);
    }

    #[test]
    fn relearning_graduation_resets_interval_with_zero_mult() {
        let relearning = card(CardType::Relearning, CardQueue::Learning, 10, 2300, 1001);
        let outcome = advance(&relearning, Ease::Good, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Review);
        assert_eq!(outcome.ivl, 1);
        assert_eq!(outcome.due, CUTOFF + 1);
        assert_eq!(outcome.factor, 2300);
    }

    #[test]
    fn relearning_graduation_applies_positive_mult() {
        let mut config = conf();
        config.lapse.mult = 0.5;
        let relearning = card(CardType::Relearning, CardQueue::Learning, 10, 2300, 1001);
        let outcome = advance(&relearning, Ease::Easy, &config, NOW_MS, CUTOFF);
        assert_eq!(outcome.ivl, 5);
    }

    #[test]
    fn relearning_again_restarts_lapse_steps() {
        let relearning = card(CardType::Relearning, CardQueue::Learning, 10, 2300, 1001);
        let outcome = advance(&relearning, Ease::Again, &conf(), NOW_MS, CUTOFF);
        assert_eq!(outcome.kind, CardType::Relearning);
        assert_eq!(outcome.due, NOW_SECS + 600);
        assert_eq!(outcome.left, 1001);
        assert_eq!(outcome.ivl, 10);
    }

    #[test]
    fn outcomes_stay_in_valid_ranges() {
        let cards = [
            new_card(),
            card(CardType::Learning, CardQueue::Learning, 60, 0, 2002),
            review_card(1, 1300),
            review_card(400, 3100),
            card(CardType::Relearning, CardQueue::Learning, 7, 1800, 1001),
        ];
        for c in &cards {
            for ease in [Ease::Again, Ease::Hard, Ease::Good, Ease::Easy] {
                let outcome = advance(c, ease, &conf(), NOW_MS, CUTOFF);
                assert!(outcome.ivl >= 0);
                assert!(outcome.factor >= 0);
                assert!(matches!(
                    outcome.queue,
                    CardQueue::Learning | CardQueue::Review
                ));
                assert!(outcome.lapses_delta >= 0);
            }
        }
    }

    #[test]
    fn revlog_kind_tracks_previous_state() {
        let outcome = advance(&new_card(), Ease::Good, &conf(), NOW_MS, CUTOFF);
        let log = revlog_entry(NOW_MS + 1, &new_card(), &outcome, Ease::Good, 1_000);
        assert_eq!(log.kind, 0);
        assert_eq!(log.usn, -1);
        assert_eq!(log.time, 1_000);

        let review = review_card(10, 2500);
        let outcome = advance(&review, Ease::Good, &conf(), NOW_MS, CUTOFF);
        let log = revlog_entry(NOW_MS + 2, &review, &outcome, Ease::Good, 1_000);
        assert_eq!(log.kind, 1);
    }
}
