/// Linear warmup then linear decay to zero.
///
/// `lr_at(step)` is the rate for the optimizer step with 0-based index
/// `step`:
///
/// ```text
/// step < warmup   base * step / warmup
/// otherwise       base * (total - step) / (total - warmup), floored at 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSchedule {
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
}

impl LinearSchedule {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self { base_lr, warmup_steps, total_steps }
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let span = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        (self.base_lr * remaining / span).max(0.0)
    }
}
