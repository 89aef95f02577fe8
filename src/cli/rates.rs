use super::ui;
use crate::core::cache::RateSnapshot;
use crate::core::currency::RateSource;
use anyhow::Result;
use comfy_table::Cell;

fn source_line(snapshot: &RateSnapshot) -> String {
    match snapshot.rates.source() {
        RateSource::Fetched { fetched_at } => {
            format!("Fetched at {}", fetched_at.format("%Y-%m-%d %H:%M:%S UTC"))
        }
        RateSource::Fallback => "Fallback rates (service unavailable)".to_string(),
    }
}

fn display_as_table(snapshot: &RateSnapshot) -> String {
    let rates = &snapshot.rates;
    let display = &snapshot.display_currency;
    let display_rate = rates.get(display);

    let mut output = format!(
        "{}\n{}\n\n",
        ui::style_text(
            &format!("Exchange rates (base {})", rates.base()),
            ui::StyleType::Title
        ),
        ui::style_text(&source_line(snapshot), ui::StyleType::Subtle)
    );

    let mut table = ui::new_styled_table();
    let mut header = vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("Per 1 {}", rates.base())),
    ];
    let show_display = display != rates.base();
    if show_display {
        header.push(ui::header_cell(&format!("Per 1 {display}")));
    }
    table.set_header(header);

    for (code, rate) in rates.iter() {
        let mut row = vec![
            Cell::new(code),
            ui::format_optional_cell(Some(rate), |v| format!("{v:.4}")),
        ];
        if show_display {
            let relative = display_rate.filter(|r| *r != 0.0).map(|r| rate / r);
            row.push(ui::format_optional_cell(relative, |v| format!("{v:.4}")));
        }
        table.add_row(row);
    }
    output.push_str(&table.to_string());

    if show_display && display_rate.is_none() {
        output.push_str("\n\n");
        output.push_str(&ui::style_text(
            &format!("No rate for {display}."),
            ui::StyleType::Subtle,
        ));
    }
    output
}

pub fn run(snapshot: &RateSnapshot) -> Result<()> {
    println!("{}", display_as_table(snapshot));
    Ok(())
}
