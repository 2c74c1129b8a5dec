use chrono::{DateTime, FixedOffset};

use super::domain::Job;

fn when(start: &DateTime<FixedOffset>) -> String {
    start.format("%a %b %-d at %-I:%M %p").to_string()
}

fn price(job: &Job) -> String {
    match job.estimated_price {
        Some(amount) if amount > 0.0 => format!("${amount:.2}"),
        _ => "TBD".to_string(),
    }
}

/// Broadcast to every eligible contractor. Carries no access details.
pub(crate) fn offer(job: &Job) -> String {
    format!(
        "New {service} job available:\nWhen: {when}\nArea: {zip}\nEst. price: {price}\n\nReply YES {id} to accept or NO to pass.",
        service = job.service_label,
        when = when(&job.scheduled_start),
        zip = job.zip,
        price = price(job),
        id = job.id,
    )
}

/// Sent to the winning contractor, now including home access details.
pub(crate) fn assignment_confirmation(job: &Job) -> String {
    let method = if job.access.method.trim().is_empty() {
        "Not specified"
    } else {
        job.access.method.trim()
    };

    let mut message = format!(
        "You accepted job {id}:\nCustomer: {customer}\nWhen: {when}\nEst. price: {price}\nEntry: {method}\n",
        id = job.id,
        customer = job.customer.name,
        when = when(&job.scheduled_start),
        price = price(job),
    );
    if !job.access.notes.trim().is_empty() {
        message.push_str(&format!("Notes: {}\n", job.access.notes.trim()));
    }
    message.push_str("\nWe'll share final details in your Alloy dashboard.");
    message
}

pub(crate) fn job_filled(job: &Job) -> String {
    format!(
        "Job {id} on {when} has been claimed by another contractor. Thanks for responding!",
        id = job.id,
        when = when(&job.scheduled_start),
    )
}

pub(crate) fn customer_assigned(job: &Job, contractor_name: &str) -> String {
    format!(
        "Your {service} on {when} has been assigned to {contractor_name}. They will contact you before arrival.",
        service = job.service_label.to_lowercase(),
        when = when(&job.scheduled_start),
    )
}

pub(crate) fn already_taken(job_id: &str) -> String {
    format!("Sorry, job {job_id} was already taken by another contractor.")
}

pub(crate) fn clarification(job_id: &str) -> String {
    format!("We couldn't read your reply. Reply YES {job_id} to accept or NO to pass.")
}
