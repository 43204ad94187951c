use time::OffsetDateTime;

use crate::config::TariffConfig;

/// Cost is only worked out on the hour and half hour.
pub fn is_tariff_boundary(local: OffsetDateTime) -> bool {
    local.minute() % 30 == 0 && local.second() == 0
}

/// Rate per kWh for `net_wh` of grid energy at local time `local`.
///
/// Net export is paid at the export rate whatever the time of day.
pub fn rate_for(tariff: &TariffConfig, local: OffsetDateTime, net_wh: f64) -> f64 {
    if net_wh < 0.0 {
        return tariff.export;
    }

    let weekday = local.weekday().number_days_from_sunday();
    let hour = local.hour();
    let peak = tariff.peak_days.contains(&weekday)
        && tariff
            .peak_hours
            .iter()
            .any(|(start, end)| hour >= *start && hour < *end);

    if peak {
        tariff.peak
    } else {
        tariff.offpeak
    }
}

/// Cost of `net_wh` in hundredths of the currency unit. Negative for net export.
pub fn cost_cents(tariff: &TariffConfig, local: OffsetDateTime, net_wh: f64) -> f64 {
    net_wh / 1000.0 * rate_for(tariff, local, net_wh) * 100.0
}
