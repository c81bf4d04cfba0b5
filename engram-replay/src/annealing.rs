//! Temperature schedules for the annealing loop.

use engram_core::params::{ReplayParameters, TemperatureCalendar, TemperatureSchedule};

/// Temperature at a given annealing step.
///
/// Geometric: T0 * rho^step. Logarithmic: T0 / ln(e + step). Calendar:
/// lookup by episode age bucket; the first calendar covering the age wins,
/// falling back to geometric when none does.
pub fn temperature_at(
    params: &ReplayParameters,
    step: usize,
    episode_age_hours: u64,
) -> f64 {
    match params.schedule {
        TemperatureSchedule::Geometric => {
            params.initial_temperature * params.cooling_rate.powi(step as i32)
        }
        TemperatureSchedule::Logarithmic => {
            params.initial_temperature / (std::f64::consts::E + step as f64).ln()
        }
        TemperatureSchedule::Calendar => {
            match pick_calendar(&params.calendars, episode_age_hours) {
                Some(cal) => cal.temperature_at(step),
                None => params.initial_temperature * params.cooling_rate.powi(step as i32),
            }
        }
    }
}

/// First calendar covering the age, in declaration order.
pub fn pick_calendar(
    calendars: &[TemperatureCalendar],
    age_hours: u64,
) -> Option<&TemperatureCalendar> {
    calendars.iter().find(|c| c.covers(age_hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(schedule: TemperatureSchedule) -> ReplayParameters {
        ReplayParameters {
            initial_temperature: 2.0,
            cooling_rate: 0.5,
            schedule,
            ..Default::default()
        }
    }

    #[test]
    fn geometric_halves_each_step() {
        let p = params(TemperatureSchedule::Geometric);
        assert!((temperature_at(&p, 0, 0) - 2.0).abs() < 1e-12);
        assert!((temperature_at(&p, 1, 0) - 1.0).abs() < 1e-12);
        assert!((temperature_at(&p, 2, 0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn logarithmic_decays_slowly() {
        let p = params(TemperatureSchedule::Logarithmic);
        let t0 = temperature_at(&p, 0, 0);
        let t100 = temperature_at(&p, 100, 0);
        assert!(t0 > t100);
        assert!(t100 > 0.0);
        // Slower than geometric by far.
        assert!(t100 > temperature_at(&params(TemperatureSchedule::Geometric), 100, 0));
    }

    #[test]
    fn overlapping_calendars_pick_first_declared() {
        let calendars = vec![
            TemperatureCalendar {
                name: "wide".into(),
                min_age_hours: 0,
                max_age_hours: 1000,
                temperatures: vec![3.0],
            },
            TemperatureCalendar {
                name: "narrow".into(),
                min_age_hours: 0,
                max_age_hours: 10,
                temperatures: vec![7.0],
            },
        ];
        let chosen = pick_calendar(&calendars, 5).unwrap();
        assert_eq!(chosen.name, "wide");
    }

    #[test]
    fn calendar_schedule_falls_back_without_coverage() {
        let mut p = params(TemperatureSchedule::Calendar);
        p.calendars = vec![TemperatureCalendar {
            name: "old-only".into(),
            min_age_hours: 100,
            max_age_hours: 200,
            temperatures: vec![9.0],
        }];
        // Age 5 is uncovered: geometric fallback.
        assert!((temperature_at(&p, 1, 5) - 1.0).abs() < 1e-12);
        // Age 150 is covered.
        assert!((temperature_at(&p, 1, 150) - 9.0).abs() < 1e-12);
    }
}
