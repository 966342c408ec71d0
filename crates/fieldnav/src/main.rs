//! `fieldnav` - CLI for the field navigation engine
//!
//! Talks to the control-room dispatch service and runs guided navigation
//! sessions with a replayed position feed and logged voice output.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::{mpsc, watch};

use fieldnav::cli::{
    Cli, Command, ConfigCommand, IncidentsCommand, MessageCommand, NavigateCommand, RouteCommand,
    WatchCommand,
};
use fieldnav::incidents::{FeedEvent, Incident, IncidentPoller};
use fieldnav::messaging::{self, OutgoingMessage};
use fieldnav::overlay;
use fieldnav::platform::{LogSpeechEngine, RouteReplaySensor};
use fieldnav::route::{AvoidZone, PlanContext};
use fieldnav::venue::zone_slug;
use fieldnav::{
    init_logging, Config, DispatchService, HttpDispatchService, IncidentTarget, Navigator, Output,
    RoutePlan, RouteRequest, SessionSnapshot, SessionState, VenueTable,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Incidents(cmd) => handle_incidents(&config, &cmd).await,
        Command::Watch(cmd) => handle_watch(&config, &cmd).await,
        Command::Navigate(cmd) => handle_navigate(config, &cmd).await,
        Command::Route(cmd) => handle_route(&config, &cmd).await,
        Command::Message(cmd) => handle_message(&config, &cmd).await,
        Command::Venue => handle_venue(),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn dispatch(config: &Config) -> anyhow::Result<Arc<dyn DispatchService>> {
    Ok(Arc::new(HttpDispatchService::from_config(config)?))
}

async fn fetch_incidents(service: &dyn DispatchService) -> anyhow::Result<Vec<Incident>> {
    let records = service
        .active_incidents()
        .await
        .context("Failed to fetch active incidents")?;
    Ok(records.into_iter().map(Incident::from).collect())
}

fn print_incident(incident: &Incident, venue: &VenueTable) {
    let reported = incident
        .reported_at
        .map_or_else(|| "-".to_string(), |t| t.format("%H:%M:%S").to_string());
    println!(
        "{:<12} {:<7} {:<16} {:<20} -> {:<16} {}",
        incident.id,
        incident.severity.to_string(),
        incident.kind,
        incident.location,
        incident.target(venue).target_name,
        reported
    );
}

async fn handle_incidents(config: &Config, cmd: &IncidentsCommand) -> anyhow::Result<()> {
    let venue = VenueTable::builtin()?;
    let service = dispatch(config)?;
    let incidents = fetch_incidents(service.as_ref()).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&incidents)?);
    } else if incidents.is_empty() {
        println!("No active incidents.");
    } else {
        for incident in &incidents {
            print_incident(incident, &venue);
        }
    }
    Ok(())
}

async fn handle_watch(config: &Config, cmd: &WatchCommand) -> anyhow::Result<()> {
    let venue = VenueTable::builtin()?;
    let mut poller = IncidentPoller::new(dispatch(config)?, config.poll_interval());
    let (tx, mut rx) = mpsc::unbounded_channel();
    poller.start(tx);

    println!(
        "Watching incidents every {}s (Ctrl-C to stop)",
        config.service.incident_poll_interval_secs
    );

    let mut known = BTreeSet::new();
    let mut polls = 0;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    FeedEvent::Updated(incidents) => {
                        let current: BTreeSet<String> =
                            incidents.iter().map(|i| i.id.clone()).collect();
                        for incident in incidents.iter().filter(|i| !known.contains(&i.id)) {
                            print!("+ ");
                            print_incident(incident, &venue);
                        }
                        for gone in known.difference(&current) {
                            println!("- {gone} cleared");
                        }
                        known = current;
                    }
                    FeedEvent::Failed(e) => eprintln!("Refresh failed: {e}"),
                }
                polls += 1;
                if cmd.count.is_some_and(|n| polls >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop().await;
    Ok(())
}

async fn navigate_target(
    cmd: &NavigateCommand,
    venue: &VenueTable,
    service: &dyn DispatchService,
) -> anyhow::Result<IncidentTarget> {
    if let Some(id) = &cmd.incident {
        let incidents = fetch_incidents(service).await?;
        let Some(incident) = incidents.iter().find(|i| &i.id == id) else {
            bail!("No active incident with id {id}");
        };
        return Ok(incident.target(venue));
    }

    let name = cmd.zone.as_deref().unwrap_or_default();
    let target = venue
        .canonical_name(name)
        .unwrap_or_else(|| venue.target_for_zone(&zone_slug(name)));
    Ok(IncidentTarget::location(target))
}

fn guidance_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[{}]", snapshot.state);
    if let Some(step) = &snapshot.step_text {
        line.push_str(&format!(
            " step {}/{}: {step}",
            snapshot.current_step + 1,
            snapshot.step_count
        ));
    }
    if let Some(d) = snapshot.distance_remaining_m {
        line.push_str(&format!(" | {d:.0} m"));
    }
    if let Some(eta) = &snapshot.eta_label {
        line.push_str(&format!(" | {eta}"));
    }
    if let Some(failure) = &snapshot.failure {
        line.push_str(&format!(" | {failure}"));
    }
    line
}

async fn handle_navigate(mut config: Config, cmd: &NavigateCommand) -> anyhow::Result<()> {
    if cmd.no_voice {
        config.voice.enabled_on_start = false;
    }
    if cmd.no_tracking {
        config.tracking.enabled_on_start = false;
    }

    let venue = Arc::new(VenueTable::builtin()?);
    let service = dispatch(&config)?;
    let target = navigate_target(cmd, &venue, service.as_ref()).await?;

    let (track_tx, track_rx) = watch::channel(Vec::new());
    let sensor = RouteReplaySensor::new(
        track_rx,
        config.replay_interval(),
        config.tracking.replay_step_m,
    );
    let speech = LogSpeechEngine::new(config.voice.words_per_minute);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (navigator, events) = Navigator::new(
        &config,
        venue,
        service,
        Box::new(sensor),
        Box::new(speech),
        out_tx,
    )?;

    let handle = navigator.handle();
    let engine = tokio::spawn(navigator.run(events));
    println!("Navigating to {}", target.target_name);
    handle.navigate(target)?;

    let mut track_published = false;
    let mut last_line = String::new();
    loop {
        tokio::select! {
            output = out_rx.recv() => {
                let Some(output) = output else { break };
                match output {
                    Output::Notice(notice) => println!("{notice}"),
                    Output::Snapshot(snapshot) => {
                        if !track_published {
                            if let Some(plan) = &snapshot.plan {
                                let mut track = plan.waypoints().to_vec();
                                track.push(plan.target_location());
                                track_tx.send_replace(track);
                                track_published = true;
                            }
                        }

                        if cmd.json {
                            println!("{}", serde_json::to_string(&overlay::render(&snapshot))?);
                        } else {
                            let line = guidance_line(&snapshot);
                            if line != last_line {
                                println!("{line}");
                                last_line = line;
                            }
                        }

                        if snapshot.state.is_terminal() || snapshot.state == SessionState::Failed {
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => handle.cancel()?,
        }
    }

    // The loop may already have exited on its own.
    handle.shutdown().ok();
    engine.await.context("Navigator task failed")?;
    Ok(())
}

async fn handle_route(config: &Config, cmd: &RouteCommand) -> anyhow::Result<()> {
    let venue = VenueTable::builtin()?;
    let service = dispatch(config)?;

    let from = cmd.from.as_deref().unwrap_or(&config.venue.origin);
    let to = venue.canonical_name(&cmd.to).unwrap_or(&cmd.to);
    let avoid = if cmd.avoid.is_empty() {
        config.venue.avoid.clone()
    } else {
        cmd.avoid.clone()
    };

    let origin = venue.resolve_or(from, venue.default_location().coordinate);
    let request = RouteRequest::new(from, to, avoid.clone());
    let response = service
        .calculate_route(&request)
        .await
        .context("Failed to calculate path")?;
    let plan = RoutePlan::build(
        response,
        PlanContext {
            venue: &venue,
            target_name: to,
            target_location: venue.resolve_or(to, origin),
            origin,
            avoid_zones: AvoidZone::resolve_all(&venue, &avoid, config.venue.avoid_radius_m),
            walking_speed_kmh: config.navigation.walking_speed_kmh,
        },
    );

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Route: {from} -> {}", plan.target_name());
    println!(
        "  Distance:   {:.1} km",
        plan.total_distance_meters() / 1000.0
    );
    println!("  ETA:        {}", plan.eta_label());
    if !plan.avoid_zones().is_empty() {
        let names: Vec<&str> = plan.avoid_zones().iter().map(|z| z.name.as_str()).collect();
        println!("  Avoiding:   {}", names.join(", "));
    }
    if plan.has_route() {
        println!("  Path:       {}", plan.waypoint_names().join(" -> "));
    }
    println!();
    for (i, step) in plan.steps().iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
    Ok(())
}

async fn handle_message(config: &Config, cmd: &MessageCommand) -> anyhow::Result<()> {
    let message = OutgoingMessage::new(
        config.service.responder_name.as_str(),
        &cmd.text,
        cmd.incident.clone(),
    )?;
    let service = dispatch(config)?;
    let result = service.send_message(&message).await;
    println!("{}", messaging::notice_for(&result));
    result?;
    Ok(())
}

fn handle_venue() -> anyhow::Result<()> {
    let venue = VenueTable::builtin()?;
    for location in venue.iter() {
        println!("{:<16} {}", location.name, location.coordinate);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Navigation]");
                println!("  Arrival radius (m): {}", config.navigation.arrival_radius_m);
                println!("  Walking speed:      {} km/h", config.navigation.walking_speed_kmh);
                println!(
                    "  Step advance (m):   {}",
                    config.navigation.step_advance_radius_m
                );
                println!();
                println!("[Service]");
                println!("  Base URL:           {}", config.service.base_url);
                println!(
                    "  Request timeout:    {}s",
                    config.service.request_timeout_secs
                );
                println!(
                    "  Poll interval:      {}s",
                    config.service.incident_poll_interval_secs
                );
                println!("  Responder:          {}", config.service.responder_name);
                println!();
                println!("[Tracking]");
                println!("  On at start:        {}", config.tracking.enabled_on_start);
                println!("  High accuracy:      {}", config.tracking.high_accuracy);
                println!("  Timeout (ms):       {}", config.tracking.timeout_ms);
                println!();
                println!("[Voice]");
                println!("  On at start:        {}", config.voice.enabled_on_start);
                println!("  Rate:               {}", config.voice.rate);
                println!();
                println!("[Venue]");
                println!("  Origin:             {}", config.venue.origin);
                println!("  Avoid:              {}", config.venue.avoid.join(", "));
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
