//! Calendar features derived from the time index
//!
//! `hour` and `month` are the defaults for irradiance models; the other
//! variants are selectable through `data.calendar_features`.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::TimeSeriesTable;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalendarFeature {
    /// Hour of day (0-23)
    Hour,
    /// Month (1-12)
    Month,
    /// Day of week (0=Monday, 6=Sunday)
    DayOfWeek,
    /// Day of month (1-31)
    DayOfMonth,
    /// Day of year (1-366)
    DayOfYear,
}

impl CalendarFeature {
    pub fn value(&self, timestamp: &NaiveDateTime) -> f64 {
        let v = match self {
            Self::Hour => timestamp.hour(),
            Self::Month => timestamp.month(),
            Self::DayOfWeek => timestamp.weekday().num_days_from_monday(),
            Self::DayOfMonth => timestamp.day(),
            Self::DayOfYear => timestamp.ordinal(),
        };
        v as f64
    }

    /// Column label used in the schema
    pub fn column_name(&self) -> String {
        self.to_string()
    }
}

/// Append one column per feature, in the given order
pub fn add_calendar_features(
    table: TimeSeriesTable,
    features: &[CalendarFeature],
) -> Result<TimeSeriesTable> {
    features.iter().try_fold(table, |table, feature| {
        let column = table.timestamps().iter().map(|t| feature.value(t)).collect();
        table.with_column(&feature.column_name(), column)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Schema;
    use chrono::NaiveDate;
    use ndarray::array;

    #[test]
    fn test_feature_values() {
        // Friday 2024-06-21 13:00
        let ts = NaiveDate::from_ymd_opt(2024, 6, 21)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();
        assert_eq!(CalendarFeature::Hour.value(&ts), 13.0);
        assert_eq!(CalendarFeature::Month.value(&ts), 6.0);
        assert_eq!(CalendarFeature::DayOfWeek.value(&ts), 4.0);
        assert_eq!(CalendarFeature::DayOfMonth.value(&ts), 21.0);
        assert_eq!(CalendarFeature::DayOfYear.value(&ts), 173.0);
    }

    #[test]
    fn test_column_names_match_config_spelling() {
        assert_eq!(CalendarFeature::DayOfWeek.column_name(), "day_of_week");
        assert_eq!(CalendarFeature::Hour.column_name(), "hour");
    }

    #[test]
    fn test_add_calendar_features_appends_in_order() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let table = TimeSeriesTable::new(
            Schema::new("ghi", &[]).unwrap(),
            vec![day.and_hms_opt(5, 0, 0).unwrap(), day.and_hms_opt(6, 0, 0).unwrap()],
            array![[0.0], [12.0]],
        )
        .unwrap();

        let table =
            add_calendar_features(table, &[CalendarFeature::Hour, CalendarFeature::Month]).unwrap();

        assert_eq!(
            table.schema().columns(),
            &["ghi".to_string(), "hour".to_string(), "month".to_string()]
        );
        assert_eq!(table.column("hour").unwrap().to_vec(), vec![5.0, 6.0]);
        assert_eq!(table.column("month").unwrap().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let table = TimeSeriesTable::new(
            Schema::new("ghi", &[]).unwrap(),
            vec![day.and_hms_opt(5, 0, 0).unwrap()],
            array![[0.0]],
        )
        .unwrap();
        assert!(add_calendar_features(table, &[CalendarFeature::Hour, CalendarFeature::Hour]).is_err());
    }
}
