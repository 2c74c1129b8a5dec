use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{normalize_tag, normalize_zip, Contractor, ContractorId};
use crate::phone::{PhoneNumber, PhoneNumberError};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read contractor directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid contractor CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("contractor {id} has an invalid phone number: {source}")]
    InvalidPhone {
        id: String,
        source: PhoneNumberError,
    },
    #[error("contractor {id} has an invalid rating '{value}'")]
    InvalidRating { id: String, value: String },
    #[error("phone {phone} is assigned to both {first} and {second}")]
    DuplicatePhone {
        phone: PhoneNumber,
        first: ContractorId,
        second: ContractorId,
    },
    #[error("contractor id {0} appears more than once")]
    DuplicateId(ContractorId),
}

/// In-memory contractor roster, read-only to the dispatch core.
#[derive(Debug, Clone, Default)]
pub struct ContractorDirectory {
    contractors: Vec<Contractor>,
}

impl ContractorDirectory {
    /// Build a directory, rejecting duplicate ids and phone numbers.
    pub fn new(contractors: Vec<Contractor>) -> Result<Self, DirectoryError> {
        let mut ids = HashSet::new();
        for contractor in &contractors {
            if !ids.insert(contractor.id.clone()) {
                return Err(DirectoryError::DuplicateId(contractor.id.clone()));
            }
        }

        for (index, contractor) in contractors.iter().enumerate() {
            if let Some(existing) = contractors[..index]
                .iter()
                .find(|other| other.phone == contractor.phone)
            {
                return Err(DirectoryError::DuplicatePhone {
                    phone: contractor.phone.clone(),
                    first: existing.id.clone(),
                    second: contractor.id.clone(),
                });
            }
        }

        Ok(Self { contractors })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Columns: `id,name,phone,active,service_area,skills,rating`. Area and skill
    /// cells hold `;`-separated tags.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DirectoryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut contractors = Vec::new();
        for row in csv_reader.deserialize::<ContractorRow>() {
            contractors.push(row?.into_contractor()?);
        }

        Self::new(contractors)
    }

    /// Active contractors skilled for `service_type` who cover `zip`, in roster order.
    pub fn list_eligible(&self, service_type: &str, zip: &str) -> Vec<Contractor> {
        self.contractors
            .iter()
            .filter(|contractor| contractor.is_eligible(service_type, zip))
            .cloned()
            .collect()
    }

    pub fn find_by_phone(&self, phone: &PhoneNumber) -> Option<&Contractor> {
        self.contractors
            .iter()
            .find(|contractor| &contractor.phone == phone)
    }

    pub fn find_by_id(&self, id: &ContractorId) -> Option<&Contractor> {
        self.contractors
            .iter()
            .find(|contractor| &contractor.id == id)
    }

    pub fn active(&self) -> Vec<Contractor> {
        self.contractors
            .iter()
            .filter(|contractor| contractor.active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contractors.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ContractorRow {
    id: String,
    name: String,
    phone: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    active: Option<String>,
    #[serde(default)]
    service_area: String,
    #[serde(default)]
    skills: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rating: Option<String>,
}

impl ContractorRow {
    fn into_contractor(self) -> Result<Contractor, DirectoryError> {
        let phone = PhoneNumber::parse(&self.phone).map_err(|source| {
            DirectoryError::InvalidPhone {
                id: self.id.clone(),
                source,
            }
        })?;

        let rating = match self.rating {
            Some(raw) => Some(raw.parse::<f32>().map_err(|_| {
                DirectoryError::InvalidRating {
                    id: self.id.clone(),
                    value: raw.clone(),
                }
            })?),
            None => None,
        };

        let active = match self.active.as_deref().map(str::to_ascii_lowercase) {
            None => true,
            Some(flag) => matches!(flag.as_str(), "true" | "yes" | "1" | "y"),
        };

        Ok(Contractor {
            id: ContractorId(self.id),
            name: self.name,
            phone,
            active,
            service_area: split_zips(&self.service_area),
            skills: split_tags(&self.skills),
            rating,
        })
    }
}

fn split_tags(cell: &str) -> BTreeSet<String> {
    cell.split(';')
        .map(normalize_tag)
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn split_zips(cell: &str) -> BTreeSet<String> {
    cell.split(';')
        .map(normalize_zip)
        .filter(|zip| !zip.is_empty())
        .collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ROSTER: &str = "\
id,name,phone,active,service_area,skills,rating
ctr-kelly,Kelly Kurzman,(541) 555-0101,true,97701;97702,cleaning;deep_cleaning,4.9
ctr-omar,Omar Diaz,541-555-0102,,97701,cleaning,
ctr-lee,Lee Park,5415550103,false,97701,cleaning,4.1
ctr-ana,Ana Ruiz,5415550104,yes,97703,Cleaning,
";

    fn directory() -> ContractorDirectory {
        ContractorDirectory::from_csv_reader(Cursor::new(ROSTER)).expect("roster parses")
    }

    #[test]
    fn parses_tags_flags_and_ratings() {
        let directory = directory();
        assert_eq!(directory.len(), 4);

        let kelly = directory
            .find_by_id(&ContractorId("ctr-kelly".to_string()))
            .expect("kelly present");
        assert_eq!(kelly.phone.as_str(), "+15415550101");
        assert!(kelly.service_area.contains("97702"));
        assert!(kelly.skills.contains("deep_cleaning"));
        assert_eq!(kelly.rating, Some(4.9));

        let omar = directory
            .find_by_id(&ContractorId("ctr-omar".to_string()))
            .expect("omar present");
        assert!(omar.active, "blank active column defaults to active");
        assert_eq!(omar.rating, None);
    }

    #[test]
    fn list_eligible_filters_and_keeps_roster_order() {
        let eligible = directory().list_eligible("cleaning", "97701");
        let ids: Vec<_> = eligible.iter().map(|c| c.id.0.as_str()).collect();
        assert_eq!(ids, vec!["ctr-kelly", "ctr-omar"]);
    }

    #[test]
    fn list_eligible_can_be_empty() {
        assert!(directory().list_eligible("landscaping", "97701").is_empty());
        assert!(directory().list_eligible("cleaning", "10001").is_empty());
    }

    #[test]
    fn active_excludes_inactive_contractors() {
        let active = directory().active();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|c| c.id.0 != "ctr-lee"));
    }

    #[test]
    fn find_by_phone_uses_normalized_numbers() {
        let directory = directory();
        let phone = PhoneNumber::parse("+1 541 555 0104").expect("phone");
        let found = directory.find_by_phone(&phone).expect("ana found");
        assert_eq!(found.id.0, "ctr-ana");
    }

    #[test]
    fn duplicate_phones_are_rejected() {
        let roster = "id,name,phone\nctr-a,A,5415550101\nctr-b,B,(541) 555-0101\n";
        match ContractorDirectory::from_csv_reader(Cursor::new(roster)) {
            Err(DirectoryError::DuplicatePhone { first, second, .. }) => {
                assert_eq!(first.0, "ctr-a");
                assert_eq!(second.0, "ctr-b");
            }
            other => panic!("expected duplicate phone, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let roster = "id,name,phone\nctr-a,A,5415550101\nctr-a,B,5415550102\n";
        assert!(matches!(
            ContractorDirectory::from_csv_reader(Cursor::new(roster)),
            Err(DirectoryError::DuplicateId(_))
        ));
    }

    #[test]
    fn invalid_phone_names_the_row() {
        let roster = "id,name,phone\nctr-a,A,555\n";
        match ContractorDirectory::from_csv_reader(Cursor::new(roster)) {
            Err(DirectoryError::InvalidPhone { id, .. }) => assert_eq!(id, "ctr-a"),
            other => panic!("expected invalid phone, got {other:?}"),
        }
    }
}
