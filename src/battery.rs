use std::time::Duration;

use tokio::time::Instant;

use crate::core::FULL_CHARGE;

/// Заряд у межах [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Battery {
    charge: u8,
}

impl Battery {
    pub fn new(charge: u8) -> Self {
        Self {
            charge: charge.min(FULL_CHARGE),
        }
    }

    pub fn charge(&self) -> u8 {
        self.charge
    }

    /// Знімає `amount`, не опускаючись нижче нуля.
    pub fn drain(&mut self, amount: u8) {
        self.charge = self.charge.saturating_sub(amount);
    }

    /// Списує `cost` лише якщо заряду вистачає.
    pub fn spend(&mut self, cost: u8) -> bool {
        if self.charge < cost {
            return false;
        }
        self.charge -= cost;
        true
    }

    pub fn recharge(&mut self) {
        self.charge = FULL_CHARGE;
    }
}

/// Періодичний дедлайн розряду, який можна призупинити без втрати
/// частини періоду, що вже минула.
#[derive(Debug, Clone)]
pub struct DrainTimer {
    period: Duration,
    deadline: Option<Instant>,
    remaining: Duration,
}

impl DrainTimer {
    pub fn started(period: Duration, now: Instant) -> Self {
        Self {
            period,
            deadline: Some(now + period),
            remaining: period,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(deadline) = self.deadline.take() {
            self.remaining = deadline.saturating_duration_since(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.remaining);
        }
    }

    /// Викликається, коли дедлайн настав. Наступний рахується від
    /// попереднього, тож запізнення не з'їдає тиків.
    pub fn fire(&mut self) {
        if let Some(deadline) = self.deadline {
            self.deadline = Some(deadline + self.period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_floors_at_zero() {
        let mut battery = Battery::new(2);
        battery.drain(1);
        battery.drain(1);
        battery.drain(1);
        assert_eq!(battery.charge(), 0);
    }

    #[test]
    fn test_spend_requires_full_cost() {
        let mut battery = Battery::new(4);
        assert!(!battery.spend(5));
        assert_eq!(battery.charge(), 4);
        battery.recharge();
        assert!(battery.spend(5));
        assert_eq!(battery.charge(), 95);
    }

    #[test]
    fn test_charge_is_clamped_on_creation() {
        assert_eq!(Battery::new(250).charge(), FULL_CHARGE);
    }

    #[test]
    fn test_pause_keeps_remaining_fraction() {
        let start = Instant::now();
        let period = Duration::from_millis(1000);
        let mut timer = DrainTimer::started(period, start);

        timer.pause(start + Duration::from_millis(600));
        assert!(!timer.is_running());

        let later = start + Duration::from_secs(10);
        timer.resume(later);
        assert_eq!(timer.deadline(), Some(later + Duration::from_millis(400)));

        timer.fire();
        assert_eq!(
            timer.deadline(),
            Some(later + Duration::from_millis(1400))
        );
    }

    #[test]
    fn test_double_resume_does_not_move_deadline() {
        let start = Instant::now();
        let mut timer = DrainTimer::started(Duration::from_secs(1), start);
        let deadline = timer.deadline();
        timer.resume(start + Duration::from_millis(500));
        assert_eq!(timer.deadline(), deadline);
    }
}
