use serde::{Deserialize, Serialize};

pub const DEFAULT_SWIPE_THRESHOLD_PX: f64 = 50.0;
pub const DEFAULT_MAX_VERTICAL_PX: f64 = 100.0;
pub const DEFAULT_MIN_SPEED_PX_PER_MS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureConfig {
    pub threshold: f64,
    pub max_vertical: f64,
    pub min_speed: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SWIPE_THRESHOLD_PX,
            max_vertical: DEFAULT_MAX_VERTICAL_PX,
            min_speed: DEFAULT_MIN_SPEED_PX_PER_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureIntent {
    Advance,
    Retreat,
}

#[derive(Debug, Clone, Copy)]
struct ActiveGesture {
    origin: Point,
    started_at_ms: f64,
}

#[derive(Debug, Clone)]
pub struct GestureNavigator {
    config: GestureConfig,
    enabled: bool,
    active: Option<ActiveGesture>,
}

impl Default for GestureNavigator {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

impl GestureNavigator {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            enabled: true,
            active: None,
        }
    }

    pub fn config(&self) -> GestureConfig {
        self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.active = None;
        }
    }

    pub fn has_active_gesture(&self) -> bool {
        self.active.is_some()
    }

    pub fn on_gesture_start(&mut self, point: Point, time_ms: f64) {
        if !self.enabled {
            return;
        }
        self.active = Some(ActiveGesture {
            origin: point,
            started_at_ms: time_ms,
        });
    }

    pub fn on_gesture_cancel(&mut self) {
        self.active = None;
    }

    pub fn on_gesture_end(&mut self, point: Point, time_ms: f64) -> Option<GestureIntent> {
        if !self.enabled {
            return None;
        }
        let active = self.active.take()?;
        self.classify(active, point, time_ms)
    }

    fn classify(&self, active: ActiveGesture, end: Point, time_ms: f64) -> Option<GestureIntent> {
        let dx = end.x - active.origin.x;
        let dy = (end.y - active.origin.y).abs();
        let dt = time_ms - active.started_at_ms;
        if !(dx.is_finite() && dy.is_finite() && dt.is_finite()) {
            return None;
        }

        if dy > self.config.max_vertical || dx.abs() < self.config.threshold {
            return None;
        }

        // A zero or negative interval means both events shared a timestamp.
        let speed = if dt > 0.0 { dx.abs() / dt } else { f64::INFINITY };
        if speed < self.config.min_speed {
            return None;
        }

        if dx < 0.0 {
            Some(GestureIntent::Advance)
        } else {
            Some(GestureIntent::Retreat)
        }
    }
}
