//! Demo billing API: an in-memory invoice book behind five contracts.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contractkit::schema::{array, date, enum_, number, optional, string, Schema};
use contractkit::{
    handler_fn, shape, AuthPolicy, ContractDescriptor, ContractRouter, RegistrationError, Reply,
    Request, RouteError, StreamEvent, Value,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Paid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: String,
    pub customer: String,
    pub amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct InvoiceStore {
    next_id: AtomicU64,
    invoices: RwLock<BTreeMap<String, Invoice>>,
    idempotency: RwLock<HashMap<String, String>>,
}

#[derive(Debug)]
pub enum PayOutcome {
    Paid(Invoice),
    AlreadyPaid,
    NotFound,
}

impl InvoiceStore {
    /// Create an invoice; a repeated idempotency key returns the first one.
    pub fn create(
        &self,
        customer: String,
        amount: f64,
        currency: String,
        idempotency_key: Option<&str>,
    ) -> (Invoice, bool) {
        let mut keys = self.idempotency.write();
        if let Some(existing) = idempotency_key
            .and_then(|k| keys.get(k))
            .and_then(|id| self.get(id))
        {
            return (existing, false);
        }

        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let invoice = Invoice {
            id: format!("inv-{n:04}"),
            customer,
            amount,
            currency,
            status: InvoiceStatus::Open,
            created_at: Utc::now(),
            paid_at: None,
        };
        self.invoices
            .write()
            .insert(invoice.id.clone(), invoice.clone());
        if let Some(key) = idempotency_key {
            keys.insert(key.to_string(), invoice.id.clone());
        }
        (invoice, true)
    }

    pub fn get(&self, id: &str) -> Option<Invoice> {
        self.invoices.read().get(id).cloned()
    }

    pub fn list(&self, status: Option<InvoiceStatus>) -> Vec<Invoice> {
        self.invoices
            .read()
            .values()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect()
    }

    pub fn mark_paid(&self, id: &str, at: DateTime<Utc>) -> PayOutcome {
        let mut invoices = self.invoices.write();
        match invoices.get_mut(id) {
            None => PayOutcome::NotFound,
            Some(i) if i.status == InvoiceStatus::Paid => PayOutcome::AlreadyPaid,
            Some(i) => {
                i.status = InvoiceStatus::Paid;
                i.paid_at = Some(at);
                PayOutcome::Paid(i.clone())
            }
        }
    }
}

fn invoice_schema() -> Schema {
    contractkit::schema::schemify(shape! {
        id: string(),
        customer: string(),
        amount: number(),
        currency: string(),
        status: enum_(["open", "paid"]),
        created_at: date(),
        paid_at: optional(date()),
    })
}

fn problem_schema() -> Schema {
    contractkit::schema::schemify(shape! { error: string() })
}

/// Register the billing contracts on `router`.
pub fn mount(router: &ContractRouter, store: Arc<InvoiceStore>) -> Result<(), RegistrationError> {
    let s = store.clone();
    router
        .get("/")
        .contract(
            ContractDescriptor::new("listInvoices")
                .summary("List invoices")
                .query(shape! { status: optional(enum_(["open", "paid"])) })
                .response(200, array(invoice_schema())),
        )
        .handler(handler_fn(move |req| list_invoices(s.clone(), req)))
        .register()?;

    let s = store.clone();
    router
        .post("/")
        .contract(
            ContractDescriptor::new("createInvoice")
                .summary("Create an invoice")
                .description("Honors the `idempotency-key` header.")
                .request_headers(shape! { "idempotency-key": optional(string()) })
                .body(shape! {
                    customer: string(),
                    amount: number(),
                    currency: optional(enum_(["EUR", "USD", "GBP"])),
                })
                .response(201, invoice_schema())
                .response(200, invoice_schema()),
        )
        .handler(handler_fn(move |req| create_invoice(s.clone(), req)))
        .register()?;

    let s = store.clone();
    router
        .get("/:id")
        .contract(
            ContractDescriptor::new("getInvoice")
                .summary("Fetch one invoice")
                .params(shape! { id: string() })
                .response(200, invoice_schema())
                .response(404, problem_schema()),
        )
        .handler(handler_fn(move |req| get_invoice(s.clone(), req)))
        .register()?;

    let s = store.clone();
    router
        .post("/:id/success")
        .contract(
            ContractDescriptor::new("markPaid")
                .summary("Record a successful payment")
                .params(shape! { id: string() })
                .body(optional(shape! { paid_at: optional(date()) }))
                .auth(
                    AuthPolicy::jwt()
                        .allow_roles(["clerk", "admin"])
                        .allow_slugs(["billing.write"]),
                )
                .response(200, invoice_schema())
                .response(404, problem_schema())
                .response(409, problem_schema()),
        )
        .handler(handler_fn(move |req| mark_paid(s.clone(), req)))
        .register()?;

    let s = store;
    router
        .get("/:id/events")
        .contract(
            ContractDescriptor::new("invoiceEvents")
                .summary("Stream the invoice history")
                .params(shape! { id: string() })
                .response(404, problem_schema()),
        )
        .handler(handler_fn(move |req| invoice_events(s.clone(), req)))
        .register()?;

    Ok(())
}

fn id_param(req: &Request) -> String {
    req.param("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn not_found(id: &str) -> Result<Reply, RouteError> {
    Ok(Reply::json(404, &json!({ "error": format!("invoice '{id}' not found") }))?)
}

async fn list_invoices(store: Arc<InvoiceStore>, req: Request) -> Result<Reply, RouteError> {
    let status = match req.query_value("status").and_then(Value::as_str) {
        Some("open") => Some(InvoiceStatus::Open),
        Some("paid") => Some(InvoiceStatus::Paid),
        _ => None,
    };
    Ok(Reply::json(200, &store.list(status))?)
}

async fn create_invoice(store: Arc<InvoiceStore>, req: Request) -> Result<Reply, RouteError> {
    let customer = req
        .body
        .get("customer")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let amount = req.body.get("amount").and_then(Value::as_f64).unwrap_or_default();
    let currency = req
        .body
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("EUR")
        .to_string();
    let key = req.context.as_ref().and_then(|c| c.idempotency_key.as_deref());

    let (invoice, created) = store.create(customer, amount, currency, key);
    if created {
        tracing::info!(invoice = %invoice.id, amount, "Invoice created");
    }
    Ok(Reply::json(if created { 201 } else { 200 }, &invoice)?)
}

async fn get_invoice(store: Arc<InvoiceStore>, req: Request) -> Result<Reply, RouteError> {
    let id = id_param(&req);
    match store.get(&id) {
        Some(invoice) => Ok(Reply::json(200, &invoice)?),
        None => not_found(&id),
    }
}

async fn mark_paid(store: Arc<InvoiceStore>, req: Request) -> Result<Reply, RouteError> {
    let id = id_param(&req);
    let at = match req.body.get("paid_at") {
        Some(Value::Date(d)) => *d,
        _ => Utc::now(),
    };
    let by = req
        .principal
        .as_ref()
        .map(|p| p.subject.as_str())
        .unwrap_or("unknown");

    match store.mark_paid(&id, at) {
        PayOutcome::Paid(invoice) => {
            tracing::info!(invoice = %id, by, "Invoice marked paid");
            Ok(Reply::json(200, &invoice)?)
        }
        PayOutcome::AlreadyPaid => Ok(Reply::json(
            409,
            &json!({ "error": format!("invoice '{id}' is already paid") }),
        )?),
        PayOutcome::NotFound => not_found(&id),
    }
}

async fn invoice_events(store: Arc<InvoiceStore>, req: Request) -> Result<Reply, RouteError> {
    let id = id_param(&req);
    let Some(invoice) = store.get(&id) else {
        return not_found(&id);
    };

    let mut events = vec![StreamEvent::new(
        "created",
        Value::object([
            ("amount", Value::Number(invoice.amount)),
            ("at", Value::Date(invoice.created_at)),
        ]),
    )];
    if let Some(paid_at) = invoice.paid_at {
        events.push(StreamEvent::new(
            "paid",
            Value::object([("at", Value::Date(paid_at))]),
        ));
    }
    Ok(Reply::stream(futures::stream::iter(events)))
}
