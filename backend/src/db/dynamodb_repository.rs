use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{Disease, DiseaseHistory, Plant};
use super::{DomainStore, RepositoryError};

type Item = HashMap<String, AttributeValue>;

/// DynamoDB layout:
/// - plants: partition key `name`
/// - diseases: partition key `plant_id`, sort key `name`
/// - history: partition key `id`
#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    plants_table: String,
    diseases_table: String,
    history_table: String,
}

impl DynamoDbRepository {
    pub fn new(
        client: Client,
        plants_table: String,
        diseases_table: String,
        history_table: String,
    ) -> Self {
        Self {
            client,
            plants_table,
            diseases_table,
            history_table,
        }
    }

    pub async fn get_plant_by_name(&self, name: &str) -> Result<Option<Plant>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.plants_table)
            .key("name", AttributeValue::S(name.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        result.item.map(parse_plant_from_item).transpose()
    }

    pub async fn get_disease(
        &self,
        name: &str,
        plant: &Plant,
    ) -> Result<Option<Disease>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.diseases_table)
            .key("plant_id", AttributeValue::S(plant.id.to_string()))
            .key("name", AttributeValue::S(name.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        result.item.map(parse_disease_from_item).transpose()
    }

    pub async fn put_history(&self, entry: &DiseaseHistory) -> Result<(), RepositoryError> {
        let item = history_to_item(entry);

        match self
            .client
            .put_item()
            .table_name(&self.history_table)
            .set_item(Some(item))
            .send()
            .await
        {
            Ok(_) => {
                log::info!(
                    "Created DiseaseHistory {} for user {} with plant {} and disease {:?}",
                    entry.id,
                    entry.user_id,
                    entry.plant_id,
                    entry.disease_id
                );
                Ok(())
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for history {}: {:?}", entry.id, e);
                Err(RepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    pub async fn ensure_plant(&self, name: &str) -> Result<Plant, RepositoryError> {
        if let Some(existing) = self.get_plant_by_name(name).await? {
            return Ok(existing);
        }

        let plant = Plant::new(name);
        let mut item = HashMap::new();
        item.insert("name".to_string(), AttributeValue::S(plant.name.clone()));
        item.insert("id".to_string(), AttributeValue::S(plant.id.to_string()));

        let result = self
            .client
            .put_item()
            .table_name(&self.plants_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#name)")
            .expression_attribute_names("#name", "name")
            .send()
            .await;

        match result {
            Ok(_) => {
                log::info!("Created plant {}", plant.name);
                Ok(plant)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                // Lost a race with another writer; the stored row wins.
                self.get_plant_by_name(name).await?.ok_or_else(|| {
                    RepositoryError::InvalidData(format!("plant {} vanished after insert", name))
                })
            }
            Err(e) => Err(RepositoryError::DynamoDb(e.to_string())),
        }
    }

    pub async fn ensure_disease(&self, name: &str, plant: &Plant) -> Result<Disease, RepositoryError> {
        if let Some(existing) = self.get_disease(name, plant).await? {
            return Ok(existing);
        }

        let disease = Disease::new(name, plant);
        let mut item = HashMap::new();
        item.insert(
            "plant_id".to_string(),
            AttributeValue::S(disease.plant_id.to_string()),
        );
        item.insert("name".to_string(), AttributeValue::S(disease.name.clone()));
        item.insert("id".to_string(), AttributeValue::S(disease.id.to_string()));

        let result = self
            .client
            .put_item()
            .table_name(&self.diseases_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#name)")
            .expression_attribute_names("#name", "name")
            .send()
            .await;

        match result {
            Ok(_) => {
                log::info!("Created disease {} for plant {}", disease.name, plant.name);
                Ok(disease)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                self.get_disease(name, plant).await?.ok_or_else(|| {
                    RepositoryError::InvalidData(format!(
                        "disease {} for plant {} vanished after insert",
                        name, plant.name
                    ))
                })
            }
            Err(e) => Err(RepositoryError::DynamoDb(e.to_string())),
        }
    }

    async fn scan_all(&self, table: &str) -> Result<Vec<Item>, RepositoryError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let result = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            items.extend(result.items.unwrap_or_default());
            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }

    pub async fn get_all_diseases(&self) -> Result<Vec<(Plant, Disease)>, RepositoryError> {
        let plants: HashMap<Uuid, Plant> = self
            .scan_all(&self.plants_table)
            .await?
            .into_iter()
            .map(|item| parse_plant_from_item(item).map(|p| (p.id, p)))
            .collect::<Result<_, _>>()?;

        let mut entries = Vec::new();
        for item in self.scan_all(&self.diseases_table).await? {
            let disease = parse_disease_from_item(item)?;
            let plant = plants.get(&disease.plant_id).cloned().ok_or_else(|| {
                RepositoryError::InvalidData(format!(
                    "disease {} references unknown plant {}",
                    disease.id, disease.plant_id
                ))
            })?;
            entries.push((plant, disease));
        }
        entries.sort_by(|a, b| (&a.0.name, &a.1.name).cmp(&(&b.0.name, &b.1.name)));
        Ok(entries)
    }
}

impl DomainStore for DynamoDbRepository {
    fn find_plant_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<Plant>, RepositoryError>> {
        self.get_plant_by_name(name).boxed()
    }

    fn find_disease<'a>(
        &'a self,
        name: &'a str,
        plant: &'a Plant,
    ) -> BoxFuture<'a, Result<Option<Disease>, RepositoryError>> {
        self.get_disease(name, plant).boxed()
    }

    fn create_history<'a>(
        &'a self,
        entry: &'a DiseaseHistory,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        self.put_history(entry).boxed()
    }

    fn get_or_create_plant<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Plant, RepositoryError>> {
        self.ensure_plant(name).boxed()
    }

    fn get_or_create_disease<'a>(
        &'a self,
        name: &'a str,
        plant: &'a Plant,
    ) -> BoxFuture<'a, Result<Disease, RepositoryError>> {
        self.ensure_disease(name, plant).boxed()
    }

    fn list_diseases(&self) -> BoxFuture<'_, Result<Vec<(Plant, Disease)>, RepositoryError>> {
        self.get_all_diseases().boxed()
    }
}

fn string_attr(item: &Item, name: &str) -> Result<String, RepositoryError> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", name)))
}

fn uuid_attr(item: &Item, name: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(&string_attr(item, name)?)
        .map_err(|_| RepositoryError::InvalidData(format!("Invalid {}", name)))
}

fn parse_plant_from_item(item: Item) -> Result<Plant, RepositoryError> {
    Ok(Plant {
        id: uuid_attr(&item, "id")?,
        name: string_attr(&item, "name")?,
    })
}

fn parse_disease_from_item(item: Item) -> Result<Disease, RepositoryError> {
    Ok(Disease {
        id: uuid_attr(&item, "id")?,
        plant_id: uuid_attr(&item, "plant_id")?,
        name: string_attr(&item, "name")?,
        sample_image: item.get("sample_image").and_then(|v| v.as_s().ok()).cloned(),
    })
}

fn history_to_item(entry: &DiseaseHistory) -> Item {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(entry.id.to_string()));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(entry.user_id.to_string()),
    );
    item.insert(
        "plant_id".to_string(),
        AttributeValue::S(entry.plant_id.to_string()),
    );
    if let Some(disease_id) = &entry.disease_id {
        item.insert(
            "disease_id".to_string(),
            AttributeValue::S(disease_id.to_string()),
        );
    }
    item.insert(
        "status".to_string(),
        AttributeValue::S(entry.status.to_string()),
    );
    item.insert(
        "image_url".to_string(),
        AttributeValue::S(entry.image_url.clone()),
    );
    item.insert(
        "date_detected".to_string(),
        AttributeValue::S(entry.date_detected.to_rfc3339()),
    );
    item
}
