use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AnimationConfig;
use crate::geometry::DisplayMode;
use crate::scheduler::RenderScheduler;
use crate::PageIndex;

/// The page-flip widget: reports the current page and turns to a page immediately.
pub trait FlipSurface: Send + Sync {
    fn current_page(&self) -> PageIndex;
    fn turn_to(&self, page: PageIndex);
}

/// Pages shown together with `page`. Double mode shows the first page alone, then `[2, 3]`,
/// `[4, 5]`, and so on.
pub fn spread(page: PageIndex, mode: DisplayMode, page_count: usize) -> Vec<PageIndex> {
    if page_count == 0 {
        return Vec::new();
    }
    let page = page.clamp(1, page_count);
    match mode {
        DisplayMode::Single => vec![page],
        DisplayMode::Double if page == 1 => vec![1],
        DisplayMode::Double => {
            let left = page - page % 2;
            (left..=(left + 1).min(page_count)).collect()
        }
    }
}

pub fn next_view_page(page: PageIndex, mode: DisplayMode, page_count: usize) -> PageIndex {
    let next = match spread(page, mode, page_count).last() {
        Some(&last) => last + 1,
        None => return page,
    };
    next.min(page_count.max(1))
}

pub fn previous_view_page(page: PageIndex, mode: DisplayMode, page_count: usize) -> PageIndex {
    match spread(page, mode, page_count).first() {
        Some(&first) if first > 1 => spread(first - 1, mode, page_count)[0],
        _ => 1,
    }
}

pub fn page_indicator(page: PageIndex, page_count: usize) -> Option<String> {
    if page_count == 0 {
        return None;
    }
    Some(format!("Page {} of {}", page.clamp(1, page_count), page_count))
}

/// Intermediate pages for an animated jump, ending on `target`.
pub fn plan_jump(
    current: PageIndex,
    target: PageIndex,
    page_count: usize,
    config: &AnimationConfig,
) -> Vec<PageIndex> {
    let distance = current.abs_diff(target);
    if distance == 0 || page_count == 0 {
        return Vec::new();
    }
    let steps = distance.clamp(config.min_steps, config.max_steps());
    let step_size = distance as f64 / steps as f64;
    let direction = if target > current { 1.0 } else { -1.0 };
    (1..=steps)
        .map(|step| {
            let advance = (step as f64 * step_size).min(distance as f64);
            let page = (current as f64 + direction * advance).round() as PageIndex;
            page.clamp(1, page_count)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorPhase {
    Idle,
    Animating { target: PageIndex },
}

enum AnimatorState {
    Idle,
    Animating {
        target: PageIndex,
        timer: JoinHandle<()>,
    },
}

struct AnimatorInner {
    generation: u64,
    state: AnimatorState,
}

impl AnimatorInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && matches!(self.state, AnimatorState::Animating { .. })
    }

    fn cancel(&mut self) -> bool {
        match std::mem::replace(&mut self.state, AnimatorState::Idle) {
            AnimatorState::Animating { target, timer } => {
                timer.abort();
                debug!(target, "page jump cancelled");
                true
            }
            AnimatorState::Idle => false,
        }
    }
}

/// Drives a multi-step page turn toward a distant page, pre-warming pages along the way.
pub struct NavigationAnimator {
    surface: Arc<dyn FlipSurface>,
    scheduler: Arc<RenderScheduler>,
    config: AnimationConfig,
    inner: Arc<Mutex<AnimatorInner>>,
}

impl NavigationAnimator {
    pub fn new(
        surface: Arc<dyn FlipSurface>,
        scheduler: Arc<RenderScheduler>,
        config: AnimationConfig,
    ) -> Self {
        Self {
            surface,
            scheduler,
            config,
            inner: Arc::new(Mutex::new(AnimatorInner {
                generation: 0,
                state: AnimatorState::Idle,
            })),
        }
    }

    pub fn phase(&self) -> AnimatorPhase {
        match self.inner.lock().state {
            AnimatorState::Idle => AnimatorPhase::Idle,
            AnimatorState::Animating { target, .. } => AnimatorPhase::Animating { target },
        }
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.phase(), AnimatorPhase::Animating { .. })
    }

    /// Stops any running jump; the remaining steps are discarded.
    pub fn cancel(&self) -> bool {
        self.inner.lock().cancel()
    }

    /// Cancels any running jump and animates toward `target`. Returns `false` when there is
    /// nothing to animate.
    pub fn start(&self, target: PageIndex) -> bool {
        let page_count = self.scheduler.page_count();
        let mut inner = self.inner.lock();
        inner.cancel();
        if page_count == 0 {
            return false;
        }
        let target = target.clamp(1, page_count);
        let current = self.surface.current_page();
        let steps = plan_jump(current, target, page_count, &self.config);
        if steps.is_empty() {
            return false;
        }

        let interval = self.config.total_duration() / steps.len() as u32;
        inner.generation += 1;
        let generation = inner.generation;
        info!(
            from = current,
            to = target,
            steps = steps.len(),
            "animating page jump"
        );
        let timer = tokio::spawn(run_steps(
            Arc::clone(&self.inner),
            Arc::clone(&self.surface),
            Arc::clone(&self.scheduler),
            generation,
            steps,
            interval,
        ));
        inner.state = AnimatorState::Animating { target, timer };
        true
    }
}

async fn run_steps(
    inner: Arc<Mutex<AnimatorInner>>,
    surface: Arc<dyn FlipSurface>,
    scheduler: Arc<RenderScheduler>,
    generation: u64,
    steps: Vec<PageIndex>,
    interval: Duration,
) {
    let mut steps = steps.into_iter().peekable();
    while let Some(page) = steps.next() {
        {
            let guard = inner.lock();
            if !guard.is_current(generation) {
                return;
            }
            surface.turn_to(page);
        }
        scheduler.prewarm(page);
        if steps.peek().is_some() {
            tokio::time::sleep(interval).await;
        }
    }

    let mut guard = inner.lock();
    if guard.is_current(generation) {
        guard.state = AnimatorState::Idle;
        debug!("page jump finished");
    }
}
