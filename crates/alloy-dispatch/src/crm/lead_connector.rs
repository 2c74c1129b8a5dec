use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::gateway::{
    ContactGateway, ContactUpsert, CrmError, DeliveryReceipt, JobAssignmentRecord,
    JobRecordGateway, MessagingError, MessagingGateway, SmsRecipient,
};
use crate::config::CrmConfig;

const API_VERSION: &str = "2021-07-28";
const JOB_STATUS_ASSIGNED: &str = "contractor_assigned";

/// HTTP client for the LeadConnector (GoHighLevel) REST API.
#[derive(Clone)]
pub struct LeadConnectorClient {
    http: Client,
    base_url: String,
    api_key: String,
    location_id: String,
}

impl std::fmt::Debug for LeadConnectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadConnectorClient")
            .field("base_url", &self.base_url)
            .field("location_id", &self.location_id)
            .finish_non_exhaustive()
    }
}

impl LeadConnectorClient {
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| CrmError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            location_id: config.location_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header("Version", API_VERSION)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, CrmError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| CrmError::Transport(err.to_string()))?;
        read_json(response).await
    }

    async fn find_job_record_id(&self, external_job_id: &str) -> Result<String, CrmError> {
        let body = job_search_payload(&self.location_id, external_job_id);
        let data = self
            .send(
                self.http
                    .post(self.url("/objects/custom_objects.jobs/records/search"))
                    .json(&body),
            )
            .await?;

        let record_id = data
            .get("records")
            .or_else(|| data.get("customObjectRecords"))
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .and_then(|record| record.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        record_id.ok_or_else(|| CrmError::NotFound(format!("job record {external_job_id}")))
    }
}

async fn read_json(response: Response) -> Result<Value, CrmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CrmError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let text = response
        .text()
        .await
        .map_err(|err| CrmError::Transport(err.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|_| CrmError::MalformedResponse("JSON body"))
}

#[async_trait]
impl ContactGateway for LeadConnectorClient {
    async fn upsert_contact(&self, contact: &ContactUpsert) -> Result<String, CrmError> {
        let body = contact_payload(&self.location_id, contact);
        let data = self
            .send(self.http.post(self.url("/contacts/upsert")).json(&body))
            .await?;

        let contact_id = data
            .pointer("/contact/id")
            .and_then(Value::as_str)
            .ok_or(CrmError::MalformedResponse("contact.id"))?
            .to_string();
        info!(%contact_id, source = %contact.source, "CRM contact upserted");
        Ok(contact_id)
    }
}

#[async_trait]
impl MessagingGateway for LeadConnectorClient {
    async fn send_sms(
        &self,
        recipient: &SmsRecipient,
        body: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        let contact_id = recipient
            .contact_id
            .as_deref()
            .ok_or_else(|| MessagingError::Undeliverable(recipient.label()))?;

        let payload = sms_payload(&self.location_id, contact_id, body);
        let data = self
            .send(
                self.http
                    .post(self.url("/conversations/messages"))
                    .json(&payload),
            )
            .await?;

        let message_id = data
            .get("messageId")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!(%contact_id, ?message_id, "SMS accepted by CRM");
        Ok(DeliveryReceipt { message_id })
    }
}

#[async_trait]
impl JobRecordGateway for LeadConnectorClient {
    async fn record_assignment(&self, assignment: &JobAssignmentRecord) -> Result<(), CrmError> {
        let record_id = match self.find_job_record_id(&assignment.external_job_id).await {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    external_job_id = %assignment.external_job_id,
                    error = %err,
                    "could not locate CRM job record"
                );
                return Err(err);
            }
        };

        let body = assignment_payload(assignment);
        self.send(
            self.http
                .put(self.url(&format!("/objects/custom_objects.jobs/records/{record_id}")))
                .query(&[("locationId", self.location_id.as_str())])
                .json(&body),
        )
        .await?;

        info!(
            external_job_id = %assignment.external_job_id,
            %record_id,
            contractor_id = %assignment.contractor_id,
            "CRM job record updated with assignment"
        );
        Ok(())
    }
}

pub(crate) fn contact_payload(location_id: &str, contact: &ContactUpsert) -> Value {
    let mut payload = json!({
        "locationId": location_id,
        "firstName": contact.first_name,
        "lastName": contact.last_name,
        "source": contact.source,
        "tags": contact.tags,
    });

    let optional = [
        ("email", contact.email.clone()),
        ("phone", contact.phone.as_ref().map(ToString::to_string)),
        ("address1", contact.address.clone()),
        ("city", contact.city.clone()),
        ("postalCode", contact.postal_code.clone()),
    ];
    if let Some(object) = payload.as_object_mut() {
        for (key, value) in optional {
            if let Some(value) = value {
                object.insert(key.to_string(), Value::String(value));
            }
        }

        if !contact.custom_fields.is_empty() {
            let fields: Vec<Value> = contact
                .custom_fields
                .iter()
                .map(|(key, value)| json!({ "key": key, "field_value": value }))
                .collect();
            object.insert("customFields".to_string(), Value::Array(fields));
        }
    }

    payload
}

pub(crate) fn sms_payload(location_id: &str, contact_id: &str, message: &str) -> Value {
    json!({
        "locationId": location_id,
        "contactId": contact_id,
        "type": "SMS",
        "message": message,
    })
}

pub(crate) fn job_search_payload(location_id: &str, external_job_id: &str) -> Value {
    json!({
        "locationId": location_id,
        "page": 1,
        "pageLimit": 1,
        "filters": [{
            "group": "AND",
            "filters": [{
                "field": "properties.external_job_id",
                "operator": "eq",
                "value": external_job_id,
            }],
        }],
    })
}

pub(crate) fn assignment_payload(assignment: &JobAssignmentRecord) -> Value {
    json!({
        "properties": {
            "external_job_id": assignment.external_job_id,
            "contractor_assigned_id": assignment.contractor_id,
            "contractor_assigned_name": assignment.contractor_name,
            "job_status": JOB_STATUS_ASSIGNED,
            "how_will_your_cleaner_get_into_your_home": assignment.access_method,
            "access_notes_for_your_cleaner": assignment.access_notes,
        }
    })
}
