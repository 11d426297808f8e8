use chrono::Utc;
use common::{CustomerId, Version};
use domain::{Customer, Email};
use store::{ChangeSet, Store};

use crate::commands::{CustomerInput, clean};
use crate::error::{Result, ServiceError};

/// Service for customer records.
#[derive(Clone)]
pub struct CustomerService<S: Store> {
    store: S,
}

impl<S: Store> CustomerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Customer>> {
        Ok(self.store.list_customers().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: CustomerId) -> Result<Customer> {
        self.store
            .get_customer(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("customer", id))
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, input: CustomerInput) -> Result<Customer> {
        let id = CustomerId::new();
        let (first_name, last_name, email) = self.validate(id, &input).await?;

        let customer = Customer {
            id,
            first_name,
            last_name,
            email,
            phone: clean(input.phone),
            address: clean(input.address),
            city: clean(input.city),
            postal_code: clean(input.postal_code),
            country: clean(input.country),
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        };

        let mut changes = ChangeSet::new();
        changes.insert_customer(&customer);
        self.store.commit(changes).await?;

        tracing::info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: CustomerId, input: CustomerInput) -> Result<Customer> {
        let mut customer = self.get(id).await?;
        let (first_name, last_name, email) = self.validate(id, &input).await?;

        customer.first_name = first_name;
        customer.last_name = last_name;
        customer.email = email;
        customer.phone = clean(input.phone);
        customer.address = clean(input.address);
        customer.city = clean(input.city);
        customer.postal_code = clean(input.postal_code);
        customer.country = clean(input.country);
        customer.touch();

        let mut changes = ChangeSet::new();
        changes.update_customer(&mut customer);
        self.store.commit(changes).await?;
        Ok(customer)
    }

    /// Deletes a customer without orders.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: CustomerId) -> Result<()> {
        let customer = self.get(id).await?;
        if !self.store.list_orders(Some(id)).await?.is_empty() {
            return Err(ServiceError::validation(
                "Cannot delete a customer that has orders",
            ));
        }

        let mut changes = ChangeSet::new();
        changes.delete_customer(&customer);
        self.store.commit(changes).await?;
        Ok(())
    }

    async fn validate(
        &self,
        id: CustomerId,
        input: &CustomerInput,
    ) -> Result<(String, String, Email)> {
        let first_name = Customer::validate_first_name(&input.first_name)?;
        let last_name = Customer::validate_last_name(&input.last_name)?;
        let email = Email::parse(&input.email)?;

        if let Some(existing) = self.store.find_customer_by_email(&email).await?
            && existing.id != id
        {
            return Err(ServiceError::validation(format!(
                "A customer with email '{email}' already exists"
            )));
        }
        Ok((first_name, last_name, email))
    }
}
