use monty_common::types::CreateEndpointRequest;
use monty_storage::EndpointStore;

/// Insert a default endpoint monitoring the service's own health route
/// when the table is empty, so a fresh install has something to show.
pub fn init_default_endpoint(
    endpoints: &EndpointStore,
    http_port: u16,
) -> monty_storage::Result<()> {
    if endpoints.count()? > 0 {
        return Ok(());
    }
    let endpoint = endpoints.create(CreateEndpointRequest {
        url: format!("http://localhost:{http_port}/health"),
        interval_secs: Some(10),
        ..Default::default()
    })?;
    tracing::info!(endpoint_id = %endpoint.id, url = %endpoint.url, "Seeded default endpoint");
    Ok(())
}
