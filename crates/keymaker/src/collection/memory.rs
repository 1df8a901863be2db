use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::domain::{Customer, CustomerId, Individual, IndividualId};
use super::repository::{CustomerRepository, RecordKind, RepositoryError};

/// Customers held in process memory, in insertion order.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCustomerRepository {
    customers: Arc<Mutex<Vec<Customer>>>,
}

impl InMemoryCustomerRepository {
    pub fn from_customers(customers: Vec<Customer>) -> Self {
        Self {
            customers: Arc::new(Mutex::new(customers)),
        }
    }

    /// Copy of every stored customer, for persistence layers wrapping this store.
    pub fn snapshot(&self) -> Result<Vec<Customer>, RepositoryError> {
        Ok(self.lock()?.clone())
    }

    /// Replace every stored customer with `customers`.
    pub fn restore(&self, customers: Vec<Customer>) -> Result<(), RepositoryError> {
        *self.lock()? = customers;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Customer>>, RepositoryError> {
        self.customers
            .lock()
            .map_err(|_| RepositoryError::Unavailable("customer store lock poisoned".to_string()))
    }
}

impl CustomerRepository for InMemoryCustomerRepository {
    fn insert(&self, customer: Customer) -> Result<Customer, RepositoryError> {
        let mut customers = self.lock()?;
        if customers.iter().any(|existing| existing.id == customer.id) {
            return Err(RepositoryError::Conflict(RecordKind::Customer));
        }
        customers.push(customer.clone());
        Ok(customer)
    }

    fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        self.snapshot()
    }

    fn fetch(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.lock()?.iter().find(|customer| &customer.id == id).cloned())
    }

    fn delete(&self, id: &CustomerId) -> Result<(), RepositoryError> {
        let mut customers = self.lock()?;
        let before = customers.len();
        customers.retain(|customer| &customer.id != id);
        if customers.len() == before {
            return Err(RepositoryError::NotFound(RecordKind::Customer));
        }
        Ok(())
    }

    fn modify_customer<T, E, F>(&self, id: &CustomerId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut Customer) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut customers = self.lock()?;
        let slot = customers
            .iter_mut()
            .find(|customer| &customer.id == id)
            .ok_or(RepositoryError::NotFound(RecordKind::Customer))?;

        let mut draft = slot.clone();
        draft.updated_at = Utc::now();
        let output = mutation(&mut draft)?;
        draft.id = slot.id.clone();
        *slot = draft;
        Ok(output)
    }

    fn modify_individual<T, E, F>(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        expected_version: Option<u64>,
        mutation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&Customer, &mut Individual) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut customers = self.lock()?;
        let customer = customers
            .iter_mut()
            .find(|customer| &customer.id == customer_id)
            .ok_or(RepositoryError::NotFound(RecordKind::Customer))?;
        let index = customer
            .individuals
            .iter()
            .position(|individual| &individual.id == individual_id)
            .ok_or(RepositoryError::NotFound(RecordKind::Individual))?;

        let current = &customer.individuals[index];
        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(RepositoryError::VersionConflict {
                    expected,
                    found: current.version,
                }
                .into());
            }
        }

        let version = current.version + 1;
        let mut draft = current.clone();
        draft.version = version;
        draft.updated_at = Utc::now();
        let output = mutation(customer, &mut draft)?;
        draft.id = individual_id.clone();
        draft.version = version;
        customer.individuals[index] = draft;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::domain::{ContactInfo, IndividualStatus};

    fn customer(id: &str) -> Customer {
        let now = Utc::now();
        Customer {
            id: CustomerId(id.to_string()),
            name: "Acme".to_string(),
            link: "https://collect.example.com?key=en-E-N-N-N-N-N-E".to_string(),
            endpoint: "acme".to_string(),
            individuals: vec![Individual::new(
                IndividualId("ind-1".to_string()),
                ContactInfo::default(),
                now,
            )],
            communication_settings: Default::default(),
            webhook_settings: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn modify_individual_bumps_version_and_checks_expectation() {
        let repo = InMemoryCustomerRepository::default();
        repo.insert(customer("c1")).expect("inserted");
        let (cid, iid) = (CustomerId("c1".to_string()), IndividualId("ind-1".to_string()));

        repo.modify_individual::<_, RepositoryError, _>(&cid, &iid, Some(0), |_, individual| {
            individual.status = IndividualStatus::Invited;
            Ok(())
        })
        .expect("first write");

        let stale =
            repo.modify_individual::<(), RepositoryError, _>(&cid, &iid, Some(0), |_, _| Ok(()));
        assert_eq!(
            stale,
            Err(RepositoryError::VersionConflict {
                expected: 0,
                found: 1
            })
        );

        let stored = repo.fetch(&cid).expect("fetch").expect("present");
        assert_eq!(stored.individuals[0].version, 1);
        assert_eq!(stored.individuals[0].status, IndividualStatus::Invited);
    }

    #[test]
    fn failed_mutation_leaves_record_untouched() {
        let repo = InMemoryCustomerRepository::from_customers(vec![customer("c1")]);
        let (cid, iid) = (CustomerId("c1".to_string()), IndividualId("ind-1".to_string()));

        let result =
            repo.modify_individual::<(), RepositoryError, _>(&cid, &iid, None, |_, individual| {
                individual.status = IndividualStatus::Failed;
                Err(RepositoryError::Unavailable("abort".to_string()))
            });
        assert!(result.is_err());

        let stored = repo.fetch(&cid).expect("fetch").expect("present");
        assert_eq!(stored.individuals[0].status, IndividualStatus::Pending);
        assert_eq!(stored.individuals[0].version, 0);
    }

    #[test]
    fn lookups_report_the_missing_record_kind() {
        let repo = InMemoryCustomerRepository::from_customers(vec![customer("c1")]);
        let missing_customer = repo.modify_individual::<(), RepositoryError, _>(
            &CustomerId("nope".to_string()),
            &IndividualId("ind-1".to_string()),
            None,
            |_, _| Ok(()),
        );
        assert_eq!(missing_customer, Err(RepositoryError::NotFound(RecordKind::Customer)));

        let missing_individual = repo.modify_individual::<(), RepositoryError, _>(
            &CustomerId("c1".to_string()),
            &IndividualId("ghost".to_string()),
            None,
            |_, _| Ok(()),
        );
        assert_eq!(
            missing_individual,
            Err(RepositoryError::NotFound(RecordKind::Individual))
        );
        assert_eq!(
            repo.insert(customer("c1")),
            Err(RepositoryError::Conflict(RecordKind::Customer))
        );
    }
}
