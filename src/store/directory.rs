//! Local customer and agent directory (best-effort enrichment for new sessions).

use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::Store;
use crate::domain::{phone, Agent, Customer};

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        crm_id: row.get("crm_id")?,
        name: row.get("name")?,
        phone: row.get("phone")?,
        email: row.get("email")?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        name: row.get("name")?,
        extension: row.get("extension")?,
    })
}

impl Store {
    /// Insert or refresh a customer keyed by CRM id
    pub fn upsert_customer(
        &self,
        tenant_id: &str,
        crm_id: &str,
        name: Option<&str>,
        phone_number: Option<&str>,
        email: Option<&str>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO customers (id, tenant_id, crm_id, name, phone, phone_digits, email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id, crm_id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                phone_digits = excluded.phone_digits,
                email = excluded.email",
            params![
                Uuid::new_v4().to_string(),
                tenant_id,
                crm_id,
                name,
                phone_number,
                phone_number.map(phone::normalize),
                email,
            ],
        )?;
        Ok(())
    }

    /// Customers whose last ten digits equal those of `raw`.
    ///
    /// Numbers shorter than ten digits never match.
    pub fn find_customers_by_phone(&self, tenant_id: &str, raw: &str) -> Result<Vec<Customer>> {
        let Some(key) = phone::match_key(raw) else {
            return Ok(Vec::new());
        };

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM customers
             WHERE tenant_id = ?1 AND phone_digits = ?2
             ORDER BY crm_id",
        )?;
        let customers = stmt
            .query_map(params![tenant_id, key], customer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(customers)
    }

    pub fn get_customer_by_crm_id(&self, tenant_id: &str, crm_id: &str) -> Result<Option<Customer>> {
        let customer = self
            .conn()
            .query_row(
                "SELECT * FROM customers WHERE tenant_id = ?1 AND crm_id = ?2",
                params![tenant_id, crm_id],
                customer_from_row,
            )
            .optional()?;
        Ok(customer)
    }

    pub fn upsert_agent(&self, tenant_id: &str, agent_id: &str, name: &str, extension: Option<&str>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO agents (id, tenant_id, name, extension) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, extension = excluded.extension",
            params![agent_id, tenant_id, name, extension],
        )?;
        Ok(())
    }

    pub fn find_agent_by_extension(&self, tenant_id: &str, extension: &str) -> Result<Option<Agent>> {
        let agent = self
            .conn()
            .query_row(
                "SELECT * FROM agents WHERE tenant_id = ?1 AND extension = ?2 LIMIT 1",
                params![tenant_id, extension],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let agent = self
            .conn()
            .query_row("SELECT * FROM agents WHERE id = ?1", params![agent_id], agent_from_row)
            .optional()?;
        Ok(agent)
    }
}
