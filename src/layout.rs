use crate::ranking::Thread;

/// Pixel cost model for one tab: fixed chrome plus a per-character width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabMetrics {
    pub base_px: u32,
    pub char_px: u32,
    pub margin_px: u32,
}

impl Default for TabMetrics {
    fn default() -> Self {
        Self {
            base_px: 21,
            char_px: 7,
            margin_px: 80,
        }
    }
}

impl TabMetrics {
    pub fn tab_width(&self, label: &str) -> u64 {
        u64::from(self.base_px) + u64::from(self.char_px) * label.chars().count() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabLayout {
    pub visible_tabs: Vec<String>,
    pub overflow: Vec<String>,
    /// Index into the thread order; may point into the overflow list.
    pub active_index: usize,
}

impl TabLayout {
    pub fn show_overflow(&self) -> bool {
        !self.overflow.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.visible_tabs.len() + self.overflow.len() == 1
    }
}

/// Greedy prefix packing: tabs are placed left to right until the next one
/// would reach the budget, and that tab plus everything after it overflows.
pub fn pack<'a, I>(labels: I, container_width: u32, metrics: &TabMetrics) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let budget = u64::from(container_width.saturating_sub(metrics.margin_px));
    let mut width = 0u64;
    let mut visible = Vec::new();
    let mut overflow = Vec::new();
    for label in labels {
        if overflow.is_empty() {
            width += metrics.tab_width(label);
            if width < budget {
                visible.push(label.to_string());
                continue;
            }
        }
        overflow.push(label.to_string());
    }
    (visible, overflow)
}

/// Ranked threads arranged as a tab strip. Owns the thread order so that
/// promoting an overflow entry reorders the underlying list.
#[derive(Debug, Clone)]
pub struct TabStrip {
    threads: Vec<Thread>,
    metrics: TabMetrics,
    container_width: u32,
    active: usize,
    layout: TabLayout,
}

impl TabStrip {
    pub fn new(threads: Vec<Thread>, container_width: u32, metrics: TabMetrics) -> Self {
        let mut strip = Self {
            threads,
            metrics,
            container_width,
            active: 0,
            layout: TabLayout::default(),
        };
        strip.relayout();
        strip
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn layout(&self) -> &TabLayout {
        &self.layout
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.threads.get(self.active)
    }

    /// Selects a visible tab. Returns the newly active thread, or `None` when
    /// the index is out of range or already active.
    pub fn select_tab(&mut self, index: usize) -> Option<&Thread> {
        if index >= self.layout.visible_tabs.len() || index == self.active {
            return None;
        }
        self.active = index;
        self.layout.active_index = index;
        self.threads.get(index)
    }

    /// Promotes the `index`th overflow entry to the front and makes it active.
    pub fn select_overflow(&mut self, index: usize) -> Option<&Thread> {
        if index >= self.layout.overflow.len() {
            return None;
        }
        let position = self.layout.visible_tabs.len() + index;
        let thread = self.threads.remove(position);
        self.threads.insert(0, thread);
        self.active = 0;
        self.relayout();
        self.threads.first()
    }

    pub fn resize(&mut self, container_width: u32) {
        if container_width == self.container_width {
            return;
        }
        self.container_width = container_width;
        self.relayout();
    }

    fn relayout(&mut self) {
        let (visible_tabs, overflow) = pack(
            self.threads.iter().map(|thread| thread.subreddit.as_str()),
            self.container_width,
            &self.metrics,
        );
        self.active = self.active.min(self.threads.len().saturating_sub(1));
        self.layout = TabLayout {
            visible_tabs,
            overflow,
            active_index: self.active,
        };
    }
}
