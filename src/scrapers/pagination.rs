//! Pagination state machine for server-side-stateful listings.
//!
//! The listing UI cannot be trusted on its own: the "next" control can
//! render without a matching server-side transition, the range label can go
//! stale, and a broken postback target re-serves the same page forever. The
//! machine cross-checks those signals and refuses to run unbounded.

use tracing::{debug, info, warn};

use super::listing::{ItemStub, ListingPage};
use super::postback::PostbackRequest;

/// Consecutive empty pages tolerated before the listing is presumed finished.
pub const DEFAULT_EMPTY_PAGE_THRESHOLD: u32 = 2;

/// Consecutive identical displayed ranges tolerated before aborting.
pub const DEFAULT_REPEAT_THRESHOLD: u32 = 3;

/// Lifecycle of one crawl session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Start,
    AwaitingPage,
    HasPage,
    Paginating,
    Exhausted,
    Aborted,
}

/// What to do after observing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDecision {
    /// Issue exactly this postback to advance.
    Continue(PostbackRequest),
    /// The result set is finished.
    Exhausted(ExhaustedReason),
    /// The crawl is looping and must stop.
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedReason {
    /// Too many consecutive pages without items.
    EmptyPages,
    /// Neither the next control nor the range label warrants another page.
    NoContinuationSignal,
    /// The range label promises more rows but the page has no pager to act on.
    NoNextControl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The same displayed range was observed `count` consecutive times.
    RepeatedRange { start: u64, end: u64, count: u32 },
}

/// Outcome of observing one page.
#[derive(Debug, Clone)]
pub struct PageStep {
    pub items: Vec<ItemStub>,
    pub decision: StepDecision,
}

/// Drives sequential navigation through a postback-paginated listing.
///
/// Guard counters live on the instance, so independent crawl sessions never
/// share state.
#[derive(Debug)]
pub struct PaginationStateMachine {
    state: PaginationState,
    last_range: Option<(u64, u64)>,
    range_streak: u32,
    empty_pages: u32,
    empty_threshold: u32,
    repeat_threshold: u32,
}

impl Default for PaginationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PaginationStateMachine {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_EMPTY_PAGE_THRESHOLD, DEFAULT_REPEAT_THRESHOLD)
    }

    pub fn with_thresholds(empty_threshold: u32, repeat_threshold: u32) -> Self {
        Self {
            state: PaginationState::Start,
            last_range: None,
            range_streak: 0,
            empty_pages: 0,
            empty_threshold,
            repeat_threshold,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PaginationState::Exhausted | PaginationState::Aborted
        )
    }

    /// Mark one listing fetch in flight.
    ///
    /// The postback protocol is session-stateful: exactly one listing
    /// request may be outstanding, strictly in order.
    pub fn begin_fetch(&mut self) {
        debug_assert!(
            matches!(
                self.state,
                PaginationState::Start | PaginationState::Paginating
            ),
            "listing fetch started from {:?}",
            self.state
        );
        self.state = PaginationState::AwaitingPage;
    }

    /// Consume one rendered page snapshot and decide what happens next.
    pub fn observe(&mut self, page: &ListingPage) -> PageStep {
        debug_assert!(!self.is_terminal(), "page observed after terminal state");
        self.state = PaginationState::HasPage;

        let items = page.items.clone();

        // Empty-page guard: the UI does not reliably disable its next
        // control on the last page.
        if items.is_empty() {
            self.empty_pages += 1;
            if self.empty_pages >= self.empty_threshold {
                info!(
                    "Listing exhausted: {} consecutive empty pages",
                    self.empty_pages
                );
                self.state = PaginationState::Exhausted;
                return PageStep {
                    items,
                    decision: StepDecision::Exhausted(ExhaustedReason::EmptyPages),
                };
            }
        } else {
            self.empty_pages = 0;
        }

        // Loop guard: a postback target that fails to advance server-side
        // state re-serves the same display window forever. Pages with no
        // range label leave the streak untouched.
        if let Some(range) = page.range {
            let window = (range.start, range.end);
            if self.last_range == Some(window) {
                self.range_streak += 1;
            } else {
                self.last_range = Some(window);
                self.range_streak = 1;
            }

            if self.range_streak >= self.repeat_threshold {
                warn!(
                    "Crawl loop detected: rows {}-{} observed {} times in a row",
                    range.start, range.end, self.range_streak
                );
                self.state = PaginationState::Aborted;
                return PageStep {
                    items,
                    decision: StepDecision::Aborted(AbortReason::RepeatedRange {
                        start: range.start,
                        end: range.end,
                        count: self.range_streak,
                    }),
                };
            }
        }

        // Continuation: the next control and the range label are each
        // unreliable alone, so both are consulted.
        let next_enabled = page
            .next
            .as_ref()
            .map(|n| n.enabled && !n.target.is_empty())
            .unwrap_or(false);
        let more_by_range = page
            .range
            .and_then(|r| r.total.map(|total| r.end < total))
            .unwrap_or(false);

        if !next_enabled && !more_by_range {
            info!("Listing exhausted: no continuation signal on {}", page.url);
            self.state = PaginationState::Exhausted;
            return PageStep {
                items,
                decision: StepDecision::Exhausted(ExhaustedReason::NoContinuationSignal),
            };
        }

        let Some(next) = page.next.as_ref().filter(|n| !n.target.is_empty()) else {
            // The label promises more rows but there is nothing to click.
            warn!(
                "Range reports more rows but no next control is present on {}",
                page.url
            );
            self.state = PaginationState::Exhausted;
            return PageStep {
                items,
                decision: StepDecision::Exhausted(ExhaustedReason::NoNextControl),
            };
        };

        let request = PostbackRequest {
            target: next.target.clone(),
            argument: next.argument.clone(),
            tokens: page.tokens.clone(),
        };
        debug!("Paginating: {} {:?}", request.target, request.argument);
        self.state = PaginationState::Paginating;
        PageStep {
            items,
            decision: StepDecision::Continue(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::listing::{DisplayedRange, NextControl};
    use crate::scrapers::postback::PostbackTokens;

    fn page(
        items: usize,
        range: Option<(u64, u64, Option<u64>)>,
        next: Option<(bool, &str)>,
    ) -> ListingPage {
        ListingPage {
            url: "https://docs.wto.org/dol2fe/Pages/FE_Search/FE_S_S006.aspx".to_string(),
            items: (0..items)
                .map(|i| ItemStub {
                    title: format!("Doc {i}"),
                    detail_url: format!("https://docs.wto.org/Docs/doc_{i}.pdf"),
                })
                .collect(),
            range: range.map(|(start, end, total)| DisplayedRange { start, end, total }),
            next: next.map(|(enabled, target)| NextControl {
                target: target.to_string(),
                argument: String::new(),
                enabled,
            }),
            tokens: PostbackTokens {
                view_state: "VS".to_string(),
                view_state_generator: "GEN".to_string(),
                event_validation: "EV".to_string(),
            },
        }
    }

    const NEXT: &str = "ctl00$MainPlaceHolder$lnkNext";

    #[test]
    fn test_aborts_exactly_at_third_identical_range() {
        let mut machine = PaginationStateMachine::new();

        let ranges = [(1, 20), (21, 40), (21, 40), (21, 40)];
        let mut decisions = Vec::new();
        for (start, end) in ranges {
            machine.begin_fetch();
            let step = machine.observe(&page(20, Some((start, end, Some(137))), Some((true, NEXT))));
            decisions.push(step.decision);
        }

        assert!(matches!(decisions[0], StepDecision::Continue(_)));
        assert!(matches!(decisions[1], StepDecision::Continue(_)));
        assert!(matches!(decisions[2], StepDecision::Continue(_)));
        assert_eq!(
            decisions[3],
            StepDecision::Aborted(AbortReason::RepeatedRange {
                start: 21,
                end: 40,
                count: 3
            })
        );
        assert_eq!(machine.state(), PaginationState::Aborted);
    }

    #[test]
    fn test_changed_range_resets_repeat_tracking() {
        let mut machine = PaginationStateMachine::new();

        for (start, end) in [(1, 20), (1, 20), (21, 40), (21, 40)] {
            machine.begin_fetch();
            let step = machine.observe(&page(20, Some((start, end, Some(137))), Some((true, NEXT))));
            assert!(matches!(step.decision, StepDecision::Continue(_)));
        }
        assert_eq!(machine.state(), PaginationState::Paginating);
    }

    #[test]
    fn test_exhausts_after_second_empty_page() {
        let mut machine = PaginationStateMachine::new();

        machine.begin_fetch();
        let first = machine.observe(&page(0, Some((1, 20, Some(137))), Some((true, NEXT))));
        assert!(matches!(first.decision, StepDecision::Continue(_)));

        machine.begin_fetch();
        let second = machine.observe(&page(0, Some((21, 40, Some(137))), Some((true, NEXT))));
        assert_eq!(
            second.decision,
            StepDecision::Exhausted(ExhaustedReason::EmptyPages)
        );
        assert!(machine.is_terminal());
    }

    #[test]
    fn test_nonempty_page_resets_empty_counter() {
        let mut machine = PaginationStateMachine::new();

        machine.begin_fetch();
        machine.observe(&page(0, Some((1, 20, Some(137))), Some((true, NEXT))));
        machine.begin_fetch();
        machine.observe(&page(5, Some((21, 40, Some(137))), Some((true, NEXT))));
        machine.begin_fetch();
        let step = machine.observe(&page(0, Some((41, 60, Some(137))), Some((true, NEXT))));

        // Only one empty page in a row again: keep going.
        assert!(matches!(step.decision, StepDecision::Continue(_)));
    }

    #[test]
    fn test_continue_carries_tokens_verbatim() {
        let mut machine = PaginationStateMachine::new();

        machine.begin_fetch();
        let step = machine.observe(&page(20, Some((1, 20, Some(137))), Some((true, NEXT))));
        match step.decision {
            StepDecision::Continue(request) => {
                assert_eq!(request.target, NEXT);
                assert_eq!(request.tokens.view_state, "VS");
                assert_eq!(request.tokens.view_state_generator, "GEN");
                assert_eq!(request.tokens.event_validation, "EV");
            }
            other => panic!("expected Continue, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_label_disabled_next_still_continues_by_range() {
        let mut machine = PaginationStateMachine::new();

        // Disabled control but the label says 40 < 137: advance with the
        // control's target anyway.
        machine.begin_fetch();
        let step = machine.observe(&page(20, Some((21, 40, Some(137))), Some((false, NEXT))));
        assert!(matches!(step.decision, StepDecision::Continue(_)));
    }

    #[test]
    fn test_no_signals_means_exhausted() {
        let mut machine = PaginationStateMachine::new();

        machine.begin_fetch();
        let step = machine.observe(&page(20, Some((121, 137, Some(137))), Some((false, NEXT))));
        assert_eq!(
            step.decision,
            StepDecision::Exhausted(ExhaustedReason::NoContinuationSignal)
        );

        let mut machine = PaginationStateMachine::new();
        machine.begin_fetch();
        let step = machine.observe(&page(20, None, None));
        assert_eq!(
            step.decision,
            StepDecision::Exhausted(ExhaustedReason::NoContinuationSignal)
        );
    }

    #[test]
    fn test_range_promises_more_but_no_pager() {
        let mut machine = PaginationStateMachine::new();

        machine.begin_fetch();
        let step = machine.observe(&page(20, Some((1, 20, Some(137))), None));
        assert_eq!(
            step.decision,
            StepDecision::Exhausted(ExhaustedReason::NoNextControl)
        );
    }

    #[test]
    fn test_sessions_do_not_share_counters() {
        let mut a = PaginationStateMachine::new();
        let mut b = PaginationStateMachine::new();

        a.begin_fetch();
        a.observe(&page(20, Some((21, 40, Some(137))), Some((true, NEXT))));
        a.begin_fetch();
        a.observe(&page(20, Some((21, 40, Some(137))), Some((true, NEXT))));

        // A fresh machine seeing the same range once is unaffected by `a`.
        b.begin_fetch();
        let step = b.observe(&page(20, Some((21, 40, Some(137))), Some((true, NEXT))));
        assert!(matches!(step.decision, StepDecision::Continue(_)));
        assert_eq!(b.state(), PaginationState::Paginating);
    }
}
