//! Display strings shown next to a live estimate.

pub fn format_energy(energy_wh: f64) -> String {
    if energy_wh < 1.0 {
        format!("{:.2} mWh", energy_wh * 1000.0)
    } else {
        format!("{:.3} Wh", energy_wh)
    }
}

pub fn format_carbon(carbon_g: f64) -> String {
    if carbon_g < 1.0 {
        format!("{:.2} mg CO₂", carbon_g * 1000.0)
    } else {
        format!("{:.2} g CO₂", carbon_g)
    }
}

pub fn energy_color(energy_wh: f64) -> &'static str {
    if energy_wh < 0.5 {
        "#4ade80"
    } else if energy_wh < 2.0 {
        "#fbbf24"
    } else {
        "#ef4444"
    }
}

const COMPARISONS: &[(f64, &str)] = &[
    (0.1, "☕ Less than brewing a cup of coffee"),
    (0.5, "💡 Like a LED bulb for 2 minutes"),
    (1.0, "📱 Like charging your phone 2%"),
    (5.0, "💻 Like your laptop for 5 minutes"),
    (10.0, "🔋 Like charging a tablet"),
];

pub fn comparison(energy_wh: f64) -> &'static str {
    COMPARISONS
        .iter()
        .find(|(threshold, _)| energy_wh < *threshold)
        .map(|(_, text)| *text)
        .unwrap_or("⚡ Significant energy usage!")
}

pub fn suggestion(tokens: u64) -> String {
    if tokens < 50 {
        return "✅ Your prompt is already efficient!".to_string();
    }
    if tokens < 150 {
        return "💡 Consider removing filler words to save energy.".to_string();
    }
    let savings = (tokens - 100) * 100 / tokens;
    format!("💡 Try shortening by ~{savings}% to significantly reduce energy use.")
}
