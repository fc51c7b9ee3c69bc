use uuid::Uuid;

// ============================================================================
// Order Operation Inputs
// ============================================================================
//
// Every operation takes an explicit typed input struct; field-level
// validation happens before any state is mutated.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub package_id: Option<Uuid>,
    pub client_notes: Option<String>,
    pub client_attachments: Vec<String>,
}

/// An attachment as delivered by the freelancer. Only the URL survives
/// persistence; any other metadata on the uploaded object is discarded.
#[derive(Debug, Clone)]
pub struct DeliveredAttachment {
    pub url: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompleteOrderInput {
    pub order_id: Uuid,
    pub freelancer_id: Uuid,
    pub attachments: Vec<DeliveredAttachment>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelOrderInput {
    pub order_id: Uuid,
    pub requester_id: Uuid,
    pub reason: Option<String>,
}
