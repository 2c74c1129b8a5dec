use crate::infra::{InMemoryCrm, InMemoryMessenger};
use alloy_dispatch::error::AppError;
use alloy_dispatch::phone::PhoneNumber;
use alloy_dispatch::workflows::dispatch::{
    parse_booking, Contractor, ContractorDirectory, ContractorReply, DispatchService, JobStore,
    ReplyOutcome, ReplySender,
};
use alloy_dispatch::workflows::leads::{CleaningLeadRequest, LeadIntakeService};
use chrono::{Duration, Utc};
use clap::Args;
use serde_json::json;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_ROSTER: &str = "\
id,name,phone,active,service_area,skills,rating
ctr-kelly,Kelly Kurzman,5415550101,true,97701;97702,cleaning,4.9
ctr-omar,Omar Diaz,5415550102,true,97701,cleaning,4.7
ctr-lee,Lee Park,5415550103,true,97701;97703,cleaning,4.5
ctr-ana,Ana Ruiz,5415550104,false,97701,cleaning,
";

#[derive(Args, Debug)]
pub(crate) struct ContractorsArgs {
    /// Contractor roster CSV (id,name,phone,active,service_area,skills,rating)
    #[arg(long)]
    pub(crate) path: PathBuf,
    /// Only list contractors skilled for this service type (requires --zip)
    #[arg(long, requires = "zip")]
    pub(crate) service_type: Option<String>,
    /// Only list contractors covering this zip (requires --service-type)
    #[arg(long, requires = "service_type")]
    pub(crate) zip: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Roster CSV to dispatch against. Defaults to a built-in sample roster.
    #[arg(long)]
    pub(crate) contractors: Option<PathBuf>,
    /// Zip code for the sample booking.
    #[arg(long, default_value = "97701")]
    pub(crate) zip: String,
    /// Skip the lead intake portion of the demo.
    #[arg(long)]
    pub(crate) skip_lead: bool,
}

pub(crate) fn list_contractors(args: ContractorsArgs) -> Result<(), AppError> {
    let directory = ContractorDirectory::from_path(&args.path)?;
    let contractors = match (args.service_type.as_deref(), args.zip.as_deref()) {
        (Some(service_type), Some(zip)) => {
            println!("Eligible for {service_type} in {zip}:");
            directory.list_eligible(service_type, zip)
        }
        _ => {
            println!("Active contractors ({} on roster):", directory.len());
            directory.active()
        }
    };

    render_contractors(&contractors);
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let directory = match &args.contractors {
        Some(path) => ContractorDirectory::from_path(path)?,
        None => ContractorDirectory::from_csv_reader(Cursor::new(SAMPLE_ROSTER))?,
    };

    let messenger = Arc::new(InMemoryMessenger::default());
    let crm = Arc::new(InMemoryCrm::default());
    let service = DispatchService::new(
        Arc::new(directory),
        Arc::new(JobStore::new()),
        messenger.clone(),
        crm.clone(),
    );

    println!("Alloy dispatch demo");
    println!("Roster:");
    render_contractors(&service.directory().active());

    if !args.skip_lead {
        let leads = LeadIntakeService::new(crm.clone(), "Bend");
        let lead = CleaningLeadRequest {
            name: Some("Jordan Blake".to_string()),
            email: Some("jordan@example.com".to_string()),
            phone: Some("5415550190".to_string()),
            zip: Some(args.zip.clone()),
            preferred_frequency: Some("bi-weekly".to_string()),
            ..CleaningLeadRequest::default()
        };
        match leads.submit_cleaning_lead(lead).await {
            Ok(receipt) => println!("\nLead saved as contact {}", receipt.contact_id),
            Err(err) => println!("\nLead rejected: {err}"),
        }
    }

    let start = (Utc::now() + Duration::days(2)).to_rfc3339();
    let booking = match parse_booking(
        json!({
            "contact_id": "demo-contact-1",
            "full_name": "Jordan Blake",
            "postal_code": args.zip,
            "Estimated Price (Contact)": "$185",
            "How Will Your Cleaner Get Into Your Home": "Lockbox on side gate",
            "Access Notes For Your Cleaner": "Code 4411",
            "calendar": { "appointmentId": "demo-appt-1", "startTime": start }
        }),
        service.default_skill(),
    ) {
        Ok(booking) => booking,
        Err(err) => {
            println!("\nSample booking rejected: {err}");
            return Ok(());
        }
    };

    let report = match service.dispatch(booking).await {
        Ok(report) => report,
        Err(err) => {
            println!("\nDispatch failed: {err}");
            return Ok(());
        }
    };
    println!(
        "\nDispatched {} to {} contractor(s); {} delivery failure(s)",
        report.job.id, report.contractors_notified, report.deliveries_failed
    );
    if report.no_contractors_available {
        println!("No contractors cover {}; the job stays open.", report.job.zip);
        return Ok(());
    }

    let responders: Vec<PhoneNumber> = report
        .job
        .offers
        .iter()
        .map(|offer| offer.phone.clone())
        .collect();
    let replies = ["maybe later?", "YES", "yes"];
    for (phone, text) in responders.iter().rev().zip(replies) {
        let reply = ContractorReply {
            sender: ReplySender::Phone(phone.clone()),
            message_text: text.to_string(),
            job_id: None,
        };
        match service.handle_reply(reply).await {
            Ok(outcome) => println!("  {phone} replied {text:?} -> {}", describe(&outcome)),
            Err(err) => println!("  {phone} replied {text:?} -> error: {err}"),
        }
    }

    println!("\nOutbound SMS log:");
    for (recipient, body) in messenger.sent() {
        println!("  to {}:", recipient.label());
        for line in body.lines() {
            println!("    {line}");
        }
    }

    for record in crm.assignments() {
        println!(
            "\nCRM job {} assigned to {} ({})",
            record.external_job_id, record.contractor_name, record.contractor_id
        );
    }

    Ok(())
}

fn describe(outcome: &ReplyOutcome) -> String {
    match outcome {
        ReplyOutcome::Accepted {
            contractor_name,
            contractors_notified,
            ..
        } => format!("{contractor_name} won the job; {contractors_notified} other(s) notified"),
        ReplyOutcome::AlreadyTaken { job_id, .. } => format!("{job_id} already taken"),
        ReplyOutcome::Unrecognized { .. } => "not understood; clarification sent".to_string(),
        other => other.label().replace('_', " "),
    }
}

fn render_contractors(contractors: &[Contractor]) {
    if contractors.is_empty() {
        println!("  (none)");
        return;
    }
    for contractor in contractors {
        let skills: Vec<&str> = contractor.skills.iter().map(String::as_str).collect();
        let area: Vec<&str> = contractor.service_area.iter().map(String::as_str).collect();
        let rating = contractor
            .rating
            .map(|rating| format!("{rating:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<18} {:<14} rating {:<4} skills {} | zips {}",
            contractor.id.0,
            contractor.name,
            contractor.phone.as_str(),
            rating,
            skills.join(","),
            area.join(",")
        );
    }
}
