use time::{macros::format_description, Date, Time};

pub fn date_string(d: Date) -> String {
    d.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

pub fn time_string(t: Time) -> String {
    t.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    #[test]
    fn formats_and_parses_dates() {
        assert_eq!(date_string(date!(2024 - 03 - 07)), "2024-03-07");
        assert_eq!(parse_date("2024-03-07"), Some(date!(2024 - 03 - 07)));
        assert_eq!(parse_date("07/03/2024"), None);
        assert_eq!(parse_date("2024-02-30"), None);
    }

    #[test]
    fn clock_has_second_precision() {
        assert_eq!(time_string(time!(9:05:03.250)), "09:05:03");
    }
}
