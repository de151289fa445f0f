// =============================================================================
// display.rs - Iesirea vizuala catre consola operatorului
// =============================================================================
//
// Tot ce vede operatorul in terminal trece prin acest modul:
//   - banner-ul de start (configuratia activa)
//   - log-uri de stare cu badge-uri colorate
//   - alertele detectorului (PORT_SCAN rosu, TRAFFIC_SPIKE galben)
//   - linia periodica de statistici
//
// Diagnosticele interne raman pe `tracing`; aici este doar prezentare.
//
// NOTA RUST - CRATE-ul `colored`:
//   " INFO ".on_green().black().bold() -> badge cu fundal verde
// `colored` dezactiveaza culorile cand iesirea nu este un TTY.
//
// =============================================================================

use crate::config::AppConfig;
use crate::detector::{Alert, AlertKind};
use chrono::Local;
use colored::*;

const SEPARATOR_WIDTH: usize = 100;

/// Afiseaza banner-ul de start cu configuratia activa.
pub fn print_banner(config: &AppConfig) {
    let inner_width = SEPARATOR_WIDTH - 2;
    let border = "═".repeat(inner_width);

    println!();
    println!("{}", format!("╔{}╗", border).bold().cyan());
    println!(
        "{}",
        format!(
            "║{:^width$}║",
            "NETWATCH-RS  ::  PACKET INGESTION & ANOMALY DETECTION  v0.1.0",
            width = inner_width
        )
        .bold()
        .cyan()
    );
    println!("{}", format!("╠{}╣", border).bold().cyan());

    let http_line = format!(
        "  HTTP:   {}:{:<10} Latest: {} inregistrari",
        config.server.listen_address, config.server.listen_port, config.server.latest_limit
    );
    banner_line(&http_line, inner_width);

    let broker_line = if config.broker.enabled {
        format!(
            "  Broker: out {}:{}  in {}:{}",
            config.broker.host,
            config.broker.port,
            config.broker.listen_address,
            config.broker.listen_port
        )
    } else {
        "  Broker: OFF".to_string()
    };
    banner_line(&broker_line, inner_width);

    let detect_line = format!(
        "  Port scan: >={} porturi     Spike: >{} pachete/{}s",
        config.detection.port_scan_threshold,
        config.detection.spike_threshold,
        config.detection.spike_window_secs
    );
    banner_line(&detect_line, inner_width);

    println!("{}", format!("╚{}╝", border).bold().cyan());
    println!();
}

fn banner_line(text: &str, width: usize) {
    println!("{}", format!("║{:<width$}║", text, width = width).cyan());
}

pub fn print_separator() {
    println!("{}", "─".repeat(SEPARATOR_WIDTH).dimmed());
}

/// Mesaj informational - badge verde.
pub fn log_info(message: &str) {
    println!(
        "{} {} {}",
        timestamp().bold().white(),
        " INFO ".on_green().black().bold(),
        message.white()
    );
}

/// Avertisment - badge galben.
pub fn log_warning(message: &str) {
    println!(
        "{} {} {}",
        timestamp().bold().white(),
        " WARN ".on_yellow().black().bold(),
        message.yellow()
    );
}

/// Eroare non-fatala - badge rosu, pe stderr.
pub fn log_error(message: &str) {
    eprintln!(
        "{} {} {}",
        timestamp().bold().white(),
        " ERR  ".on_red().white().bold(),
        message.red()
    );
}

/// Afiseaza o alerta a detectorului.
///
/// NOTA RUST: match-ul pe `AlertKind` este exhaustiv - o varianta noua
/// de alerta nu compileaza pana nu primeste formatare aici.
pub fn log_alert(alert: &Alert) {
    let ts = alert
        .detected_at
        .with_timezone(&Local)
        .format("[%Y-%m-%d %H:%M:%S]")
        .to_string();

    let (label, unit) = match alert.kind {
        AlertKind::PortScan { .. } => ("[PORT SCAN]", "porturi distincte"),
        AlertKind::TrafficSpike { .. } => ("[TRAFFIC SPIKE]", "pachete in fereastra"),
    };
    let detail = format!("{} {}", alert.kind.metric(), unit);
    let ip = format!("[IP: {}]", alert.src_ip);

    match alert.kind {
        AlertKind::PortScan { .. } => {
            println!("{}", "─".repeat(SEPARATOR_WIDTH).red());
            println!(
                "{} {} {} {} {} | {}",
                ts.bold().white(),
                "▶▶▶".red().bold(),
                " ALERT ".on_red().white().bold(),
                label,
                ip.red().bold(),
                detail.red().bold()
            );
            println!("{}", "─".repeat(SEPARATOR_WIDTH).red());
        }
        AlertKind::TrafficSpike { .. } => {
            println!("{}", "─".repeat(SEPARATOR_WIDTH).yellow());
            println!(
                "{} {} {} {} {} | {}",
                ts.bold().white(),
                "▶▶▶".yellow().bold(),
                " ALERT ".on_yellow().black().bold(),
                label,
                ip.yellow().bold(),
                detail.yellow().bold()
            );
            println!("{}", "─".repeat(SEPARATOR_WIDTH).yellow());
        }
    }
}

/// Linia periodica de statistici.
///
/// Format: [ts] STAT 12 IP-uri urmarite | 3 agenti | 4521 inregistrari | 2 abonati
pub fn log_stats(
    tracked_ips: usize,
    agents: usize,
    records: usize,
    subscribers: usize,
    slow_warnings: u64,
) {
    println!(
        "{} {} {} IP-uri urmarite | {} agenti | {} inregistrari | {} abonati live | {} avertismente abonat lent",
        timestamp().dimmed(),
        " STAT ".on_cyan().black().bold(),
        tracked_ips.to_string().white().bold(),
        agents.to_string().white().bold(),
        records.to_string().white().bold(),
        subscribers.to_string().white().bold(),
        slow_warnings.to_string().yellow().bold()
    );
}

fn timestamp() -> String {
    Local::now().format("[%Y-%m-%d %H:%M:%S]").to_string()
}
