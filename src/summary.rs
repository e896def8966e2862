//! Per-file summary over the accepted intervals.

use crate::config::ProcessingLimits;
use crate::models::{DerivedRecord, FileSummary, LogHeader};

/// Round to three decimals; readings that round to zero are idle noise
fn rounds_to_zero(watts: f64) -> bool {
    (watts * 1000.0).round() == 0.0
}

impl FileSummary {
    /// Aggregate a finished record sequence.
    ///
    /// The initial record has no predecessor and only contributes the starting
    /// voltage. `power_output_valid` is false when any interval was dropped for
    /// wattage outside the configured limits.
    pub fn from_records(
        records: &[DerivedRecord],
        header: &LogHeader,
        limits: &ProcessingLimits,
        power_output_valid: bool,
    ) -> Self {
        let mut summary = FileSummary {
            starting_voltage: records.first().map(|r| r.sample.volts).unwrap_or(0.0),
            charge_ticks: header.charge_ticks(),
            discharge_ticks: header.discharge_ticks(),
            power_output_valid,
            ..Default::default()
        };

        let mut critical_charge_start = 0.0;
        let mut cv_point: Option<(f64, f64)> = None;

        for record in records.iter().filter(|r| r.is_interval()) {
            let r = &record.interval;
            summary.valid_intervals += 1;

            if !rounds_to_zero(r.watts) {
                summary.max_watts = Some(summary.max_watts.map_or(r.watts, |m| m.max(r.watts)));
                summary.min_watts = Some(summary.min_watts.map_or(r.watts, |m| m.min(r.watts)));
            }

            match summary.critical_voltage_onset_hours {
                None if r.avg_volts < limits.critical_voltage => {
                    summary.critical_voltage_onset_hours = Some(r.elapsed_hours);
                    critical_charge_start = r.net_accumulated_charge_mah.abs();
                }
                Some(onset) => {
                    summary.critical_voltage_duration_minutes = (r.elapsed_hours - onset) * 60.0;
                    summary.critical_accumulated_charge_mah =
                        r.net_accumulated_charge_mah.abs() - critical_charge_start;
                }
                None => {}
            }

            let temperature = record.sample.temperature_c;
            summary.max_temperature_c = Some(
                summary
                    .max_temperature_c
                    .map_or(temperature, |t| t.max(temperature)),
            );
            summary.max_temperature_rise_c = summary.max_temperature_rise_c.max(r.delta_temperature_c);

            if cv_point.is_none() && r.avg_volts >= limits.cv_point_voltage {
                cv_point = Some((r.net_accumulated_charge_mah, r.elapsed_hours));
            }

            summary.net_elapsed_hours = r.elapsed_hours;
            summary.net_accumulated_charge_mah = r.net_accumulated_charge_mah;
            summary.total_watt_hours = r.cumulative_watt_hours;
            summary.charge_watt_hours = r.charge_watt_hours;
            summary.discharge_watt_hours = r.discharge_watt_hours;
        }

        summary.time_period_valid = summary.valid_intervals > 0;
        summary.avg_watts = if summary.net_elapsed_hours != 0.0 {
            summary.total_watt_hours / summary.net_elapsed_hours
        } else {
            0.0
        };
        if let Some((cv_charge, cv_hours)) = cv_point {
            summary.cv_accumulated_charge_mah = Some(summary.net_accumulated_charge_mah - cv_charge);
            summary.cv_hours = Some(summary.net_elapsed_hours - cv_hours);
        }

        summary
    }
}
