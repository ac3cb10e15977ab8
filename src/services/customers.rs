use crate::{
    entities::{customer, customer_address, Customer, CustomerAddress},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Customer store: identity rows plus the optional 1:1 delivery address
/// checkout flattens into the order's shipping snapshot.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a customer. Email must be unique; a duplicate is a
    /// ValidationError rather than a bare database failure.
    #[instrument(skip(self))]
    pub async fn create_customer(
        &self,
        input: CreateCustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;

        let existing = Customer::find()
            .filter(customer::Column::Email.eq(&input.email))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Email {} is already registered",
                input.email
            )));
        }

        let customer = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(input.email),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            phone: Set(input.phone),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        };
        let customer = customer.insert(&*self.db).await?;

        info!("Created customer {} ({})", customer.id, customer.email);
        Ok(customer)
    }

    /// Retrieves a customer by ID.
    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    /// Creates or replaces the customer's delivery address.
    #[instrument(skip(self))]
    pub async fn upsert_address(
        &self,
        customer_id: Uuid,
        input: AddressInput,
    ) -> Result<customer_address::Model, ServiceError> {
        input.validate()?;

        self.get_customer(customer_id).await?;

        let existing = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?;

        let address = match existing {
            Some(address) => {
                let mut active: customer_address::ActiveModel = address.into();
                active.street = Set(input.street);
                active.city = Set(input.city);
                active.postal_code = Set(input.postal_code);
                active.landmark = Set(input.landmark);
                active.update(&*self.db).await?
            }
            None => {
                let address = customer_address::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    customer_id: Set(customer_id),
                    street: Set(input.street),
                    city: Set(input.city),
                    postal_code: Set(input.postal_code),
                    landmark: Set(input.landmark),
                };
                address.insert(&*self.db).await?
            }
        };

        info!("Saved address for customer {}", customer_id);
        Ok(address)
    }

    /// Gets the customer's saved address, if any.
    #[instrument(skip(self))]
    pub async fn get_address(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<customer_address::Model>, ServiceError> {
        let address = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?;
        Ok(address)
    }

    /// The free-text shipping snapshot checkout stores on the order,
    /// assembled from the saved address. NotFound when the customer has no
    /// address on file.
    #[instrument(skip(self))]
    pub async fn checkout_snapshot(&self, customer_id: Uuid) -> Result<String, ServiceError> {
        let address = self.get_address(customer_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Customer {} has no saved address", customer_id))
        })?;
        Ok(address.as_snapshot())
    }
}

/// Input for registering a customer
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerInput {
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "First name must not be empty"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name must not be empty"))]
    pub last_name: String,
    pub phone: Option<String>,
}

/// Input for saving a delivery address
#[derive(Debug, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "Street must not be empty"))]
    pub street: String,
    #[validate(length(min = 1, message = "City must not be empty"))]
    pub city: String,
    pub postal_code: Option<String>,
    pub landmark: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_customer_input_rejects_bad_email() {
        let input = CreateCustomerInput {
            email: "not-an-email".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Reyes".to_string(),
            phone: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn address_input_requires_street_and_city() {
        let input = AddressInput {
            street: String::new(),
            city: "Davao".to_string(),
            postal_code: None,
            landmark: None,
        };
        assert!(input.validate().is_err());
    }
}
