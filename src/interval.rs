//! Interval metrics between consecutive samples.
//!
//! [`IntervalProcessor`] is a pure function of two samples and the per-file
//! [`ProcessingContext`]; running watt-hour sums change only when the caller
//! commits a valid outcome.

use crate::config::ProcessingLimits;
use crate::constants::{MIN_DELTA_CHARGE_MAH, SECONDS_PER_HOUR};
use crate::models::{ConvertedSample, IntervalResult, IntervalVerdict};
use chrono::{DateTime, FixedOffset, Timelike};

/// Per-file running state: the reference sample and watt-hour sums
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingContext {
    reference: ConvertedSample,
    watt_hours: f64,
    charge_watt_hours: f64,
    discharge_watt_hours: f64,
    last_interval_watt_hours: f64,
}

impl ProcessingContext {
    /// Fix the file's first sample as the reference for elapsed time, net
    /// charge and temperature rise
    pub fn start(first: &ConvertedSample) -> Self {
        Self {
            reference: *first,
            ..Default::default()
        }
    }

    pub fn reference(&self) -> &ConvertedSample {
        &self.reference
    }

    pub fn watt_hours(&self) -> f64 {
        self.watt_hours
    }

    pub fn charge_watt_hours(&self) -> f64 {
        self.charge_watt_hours
    }

    pub fn discharge_watt_hours(&self) -> f64 {
        self.discharge_watt_hours
    }

    pub fn last_interval_watt_hours(&self) -> f64 {
        self.last_interval_watt_hours
    }

    /// Fold a valid outcome into the running sums. Rejected outcomes are ignored.
    pub fn commit(&mut self, outcome: &IntervalOutcome) {
        if !outcome.verdict.is_valid() {
            return;
        }
        self.watt_hours = outcome.result.cumulative_watt_hours;
        self.charge_watt_hours = outcome.result.charge_watt_hours;
        self.discharge_watt_hours = outcome.result.discharge_watt_hours;
        self.last_interval_watt_hours = outcome.interval_watt_hours;
    }

    /// Remove the most recently committed interval from the sums
    pub fn back_out_last_interval(&mut self) {
        let last = self.last_interval_watt_hours;
        self.watt_hours -= last;
        if last > 0.0 {
            self.charge_watt_hours -= last;
        } else {
            self.discharge_watt_hours -= last;
        }
        self.last_interval_watt_hours = 0.0;
    }
}

/// Result of processing one interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalOutcome {
    pub result: IntervalResult,
    pub verdict: IntervalVerdict,
    /// Energy of this interval alone, zero unless valid
    pub interval_watt_hours: f64,
}

/// Computes interval metrics for one file
#[derive(Debug, Clone, Copy)]
pub struct IntervalProcessor {
    limits: ProcessingLimits,
    timezone: FixedOffset,
}

impl IntervalProcessor {
    pub fn new(limits: ProcessingLimits, timezone: FixedOffset) -> Self {
        Self { limits, timezone }
    }

    /// Derive metrics for `curr` against baseline `prev`.
    ///
    /// `skip_short_checks` bypasses the minimum period and charge gate; the
    /// range checks still apply.
    pub fn process(
        &self,
        curr: &ConvertedSample,
        prev: &ConvertedSample,
        ctx: &ProcessingContext,
        skip_short_checks: bool,
    ) -> IntervalOutcome {
        let reference = ctx.reference();
        let mut result = IntervalResult {
            elapsed_hours: (curr.seconds - reference.seconds) / SECONDS_PER_HOUR,
            time_of_day_hours: self.time_of_day(curr.seconds),
            ..Default::default()
        };

        result.delta_seconds = curr.seconds - prev.seconds;
        if result.delta_seconds == 0.0 {
            result.delta_seconds = 1.0;
        }
        result.delta_accumulated_charge =
            curr.accumulated_charge_mah - prev.accumulated_charge_mah;
        result.net_accumulated_charge_mah =
            curr.accumulated_charge_mah - reference.accumulated_charge_mah;
        result.avg_volts = (curr.volts + prev.volts) / 2.0;
        result.delta_temperature_c = curr.temperature_c - reference.temperature_c;

        let too_short = result.delta_seconds.abs() < self.limits.min_sample_interval_secs
            || result.delta_accumulated_charge.abs() < MIN_DELTA_CHARGE_MAH;
        if too_short && !skip_short_checks {
            return rejected(result, IntervalVerdict::TooShort);
        }

        result.avg_current_ma =
            result.delta_accumulated_charge / (result.delta_seconds / SECONDS_PER_HOUR);
        result.watts = result.avg_volts * result.avg_current_ma / 1000.0;

        if !self.limits.watts_in_range(result.watts) {
            return rejected(result, IntervalVerdict::WattageOutOfRange);
        }
        if !self.limits.elapsed_in_range(result.elapsed_hours) {
            return rejected(result, IntervalVerdict::ElapsedTimeOutOfRange);
        }

        let interval_watt_hours = result.watts * result.delta_seconds / SECONDS_PER_HOUR;
        result.cumulative_watt_hours = ctx.watt_hours() + interval_watt_hours;
        result.charge_watt_hours = ctx.charge_watt_hours();
        result.discharge_watt_hours = ctx.discharge_watt_hours();
        if interval_watt_hours > 0.0 {
            result.charge_watt_hours += interval_watt_hours;
        } else {
            result.discharge_watt_hours += interval_watt_hours;
        }

        result.avg_watts = if result.elapsed_hours != 0.0 {
            result.cumulative_watt_hours / result.elapsed_hours
        } else {
            0.0
        };
        result.impedance = if result.avg_current_ma != 0.0 {
            result.avg_volts / result.avg_current_ma
        } else {
            0.0
        };

        IntervalOutcome {
            result,
            verdict: IntervalVerdict::Valid,
            interval_watt_hours,
        }
    }

    /// Local hour of day with fractional minutes, in the run's timezone
    fn time_of_day(&self, seconds: f64) -> f64 {
        match DateTime::from_timestamp(seconds.floor() as i64, 0) {
            Some(utc) => {
                let local = utc.with_timezone(&self.timezone);
                local.hour() as f64 + local.minute() as f64 / 60.0
            }
            None => 0.0,
        }
    }
}

fn rejected(result: IntervalResult, verdict: IntervalVerdict) -> IntervalOutcome {
    IntervalOutcome {
        result,
        verdict,
        interval_watt_hours: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seconds: f64, volts: f64, acr: f64) -> ConvertedSample {
        ConvertedSample {
            seconds,
            state_of_charge: 50.0,
            volts,
            milliamps: 0.0,
            temperature_c: 25.0,
            accumulated_charge_mah: acr,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn processor() -> IntervalProcessor {
        IntervalProcessor::new(ProcessingLimits::default(), utc())
    }

    #[test]
    fn test_zero_delta_is_clamped_to_one_second() {
        let limits = ProcessingLimits::default().with_min_sample_interval(0.0);
        let processor = IntervalProcessor::new(limits, utc());
        let prev = sample(1000.0, 7.0, 0.0);
        let curr = sample(1000.0, 7.0, 0.001);
        let ctx = ProcessingContext::start(&prev);

        let outcome = processor.process(&curr, &prev, &ctx, true);
        assert_eq!(outcome.result.delta_seconds, 1.0);
        assert!(outcome.result.avg_current_ma.is_finite());
        assert!(outcome.result.watts.is_finite());
    }

    #[test]
    fn test_short_period_is_rejected() {
        let prev = sample(1000.0, 7.0, 0.0);
        let curr = sample(1030.0, 7.0, -10.0);
        let ctx = ProcessingContext::start(&prev);

        let outcome = processor().process(&curr, &prev, &ctx, false);
        assert_eq!(outcome.verdict, IntervalVerdict::TooShort);
        assert_eq!(outcome.interval_watt_hours, 0.0);
        assert_eq!(outcome.result.delta_seconds, 30.0);
        assert_eq!(outcome.result.watts, 0.0);
    }

    #[test]
    fn test_small_charge_delta_is_rejected() {
        let prev = sample(1000.0, 7.0, 0.0);
        let curr = sample(1120.0, 7.0, -0.4);
        let ctx = ProcessingContext::start(&prev);

        let outcome = processor().process(&curr, &prev, &ctx, false);
        assert_eq!(outcome.verdict, IntervalVerdict::TooShort);
    }

    #[test]
    fn test_valid_interval_metrics() {
        let prev = sample(3600.0, 7.0, 0.0);
        let curr = sample(7200.0, 6.0, -1000.0);
        let ctx = ProcessingContext::start(&prev);

        let outcome = processor().process(&curr, &prev, &ctx, false);
        let r = outcome.result;
        assert_eq!(outcome.verdict, IntervalVerdict::Valid);
        assert_eq!(r.elapsed_hours, 1.0);
        assert_eq!(r.avg_current_ma, -1000.0);
        assert_eq!(r.avg_volts, 6.5);
        assert_eq!(r.watts, -6.5);
        assert_eq!(r.cumulative_watt_hours, -6.5);
        assert_eq!(r.discharge_watt_hours, -6.5);
        assert_eq!(r.charge_watt_hours, 0.0);
        assert_eq!(r.avg_watts, -6.5);
        assert_eq!(r.impedance, 6.5 / -1000.0);
        assert_eq!(r.net_accumulated_charge_mah, -1000.0);
        // 7200 s after the epoch is 02:00 UTC
        assert_eq!(r.time_of_day_hours, 2.0);
    }

    #[test]
    fn test_wattage_out_of_range() {
        let prev = sample(0.0, 7.0, 0.0);
        let curr = sample(60.0, 7.0, -100.0);
        let ctx = ProcessingContext::start(&prev);

        // -6000 mA at 7 V is -42 W
        let outcome = processor().process(&curr, &prev, &ctx, false);
        assert_eq!(outcome.verdict, IntervalVerdict::WattageOutOfRange);
        assert!(outcome.result.watts < -15.0);
    }

    #[test]
    fn test_wattage_is_checked_before_elapsed_time() {
        let start = sample(0.0, 7.0, 0.0);
        let prev = sample(51.0 * 3600.0, 7.0, 0.0);
        let ctx = ProcessingContext::start(&start);

        let heavy = sample(51.0 * 3600.0 + 60.0, 7.0, -100.0);
        let outcome = processor().process(&heavy, &prev, &ctx, false);
        assert_eq!(outcome.verdict, IntervalVerdict::WattageOutOfRange);

        let light = sample(51.0 * 3600.0 + 3600.0, 7.0, -100.0);
        let outcome = processor().process(&light, &prev, &ctx, false);
        assert_eq!(outcome.verdict, IntervalVerdict::ElapsedTimeOutOfRange);
    }

    #[test]
    fn test_negative_elapsed_time_is_rejected() {
        let start = sample(10_000.0, 7.0, 0.0);
        let prev = sample(5_000.0, 7.0, 0.0);
        let curr = sample(6_000.0, 7.0, -100.0);
        let ctx = ProcessingContext::start(&start);

        let outcome = processor().process(&curr, &prev, &ctx, false);
        assert_eq!(outcome.verdict, IntervalVerdict::ElapsedTimeOutOfRange);
    }

    #[test]
    fn test_commit_routes_energy_and_conserves_total() {
        let p = processor();
        let first = sample(0.0, 7.0, 0.0);
        let mut ctx = ProcessingContext::start(&first);
        let steps = [
            sample(600.0, 7.0, -50.0),
            sample(1200.0, 7.1, 20.0),
            sample(1800.0, 7.2, 90.0),
            sample(2400.0, 6.9, 30.0),
        ];

        let mut prev = first;
        for curr in steps {
            let outcome = p.process(&curr, &prev, &ctx, false);
            assert!(outcome.verdict.is_valid());
            ctx.commit(&outcome);
            prev = curr;
        }

        let split = ctx.charge_watt_hours() + ctx.discharge_watt_hours();
        assert!((split - ctx.watt_hours()).abs() <= 1e-9 * ctx.watt_hours().abs().max(1.0));
        assert!(ctx.charge_watt_hours() > 0.0);
        assert!(ctx.discharge_watt_hours() < 0.0);
    }

    #[test]
    fn test_rejected_outcome_is_not_committed() {
        let first = sample(0.0, 7.0, 0.0);
        let mut ctx = ProcessingContext::start(&first);
        let outcome = processor().process(&sample(10.0, 7.0, -5.0), &first, &ctx, false);
        ctx.commit(&outcome);
        assert_eq!(ctx.watt_hours(), 0.0);
    }

    #[test]
    fn test_back_out_last_interval() {
        let p = processor();
        let first = sample(0.0, 7.0, 0.0);
        let mut ctx = ProcessingContext::start(&first);

        let a = sample(600.0, 7.0, -50.0);
        let outcome = p.process(&a, &first, &ctx, false);
        ctx.commit(&outcome);
        let after_first = ctx.clone();

        let b = sample(1200.0, 7.0, -100.0);
        let outcome = p.process(&b, &a, &ctx, false);
        ctx.commit(&outcome);

        ctx.back_out_last_interval();
        assert!((ctx.watt_hours() - after_first.watt_hours()).abs() < 1e-12);
        assert!((ctx.discharge_watt_hours() - after_first.discharge_watt_hours()).abs() < 1e-12);
        assert_eq!(ctx.last_interval_watt_hours(), 0.0);
    }

    #[test]
    fn test_time_of_day_uses_run_timezone() {
        let est = FixedOffset::west_opt(5 * 3600).unwrap();
        let p = IntervalProcessor::new(ProcessingLimits::default(), est);
        let first = sample(0.0, 7.0, 0.0);
        let ctx = ProcessingContext::start(&first);

        // 14:30 UTC is 09:30 EST
        let outcome = p.process(&sample(14.5 * 3600.0, 7.0, -1.0), &first, &ctx, true);
        assert_eq!(outcome.result.time_of_day_hours, 9.5);
    }
}
