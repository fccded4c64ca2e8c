use client_core::{
    tracker::{ShipmentPanel, EMPTY_TITLE},
    ClientEvent, ManagementView, NoticeLevel, TrackerView,
};
use shared::{domain::Shipment, protocol::ShippingQuote};
use tokio::sync::broadcast;

pub fn print_quote(quote: &ShippingQuote) {
    println!("price: ${:.2}", quote.price);
    println!("estimated delivery: {} days", quote.estimated_days);
    if let Some(carrier) = quote.carrier.as_deref() {
        println!("carrier: {carrier}");
    }
    if let Some(valid_until) = quote.valid_until {
        println!("valid until: {}", valid_until.to_rfc3339());
    }
}

pub fn print_shipment_summary(shipment: &Shipment) {
    println!(
        "project {} shipment {} [{}]",
        shipment.project_id,
        shipment.id,
        shipment.status.label()
    );
    if let Some(tracking) = shipment.tracking_number.as_deref() {
        println!("tracking: {tracking}");
    }
    if let Some(url) = shipment.label_url.as_deref() {
        println!("label: {url}");
    }
    if let Some(url) = shipment.return_label_url.as_deref() {
        println!("return label: {url}");
    }
}

pub fn print_tracker(view: &TrackerView) {
    match view {
        TrackerView::Loading => println!("loading..."),
        TrackerView::Empty { message } => {
            println!("{EMPTY_TITLE}");
            println!("  {message}");
        }
        TrackerView::Shipment(panel) => print_panel(panel),
    }
}

fn print_panel(panel: &ShipmentPanel) {
    println!("Seguimiento de Envío [{}]", panel.badge);
    if let Some(tracking) = panel.tracking_number.as_deref() {
        println!("  N° Seguimiento: {tracking}");
    }
    for step in &panel.timeline {
        let mark = if step.completed { "x" } else { " " };
        println!("  [{mark}] {}", step.milestone.title());
    }
    if let Some(notice) = panel.return_notice {
        println!("  {notice}");
    }
    for download in &panel.downloads {
        println!("  {}: {}", download.kind.title(), download.url);
    }
    for action in &panel.actions {
        let busy = if panel.updating { " (updating)" } else { "" };
        println!("  > {} [{}]{busy}", action.label(), action.as_str());
    }
}

pub fn print_management(view: &ManagementView) {
    match view {
        ManagementView::Form => {
            println!("Información de Envío: no label yet; run `shipctl ship` to create one")
        }
        ManagementView::Tracker {
            description,
            summary,
            can_confirm_receipt,
            ..
        } => {
            println!("{description}");
            println!("  Servicio de Envío: {}", summary.carrier_or_default());
            println!("  Número de Tracking: {}", summary.tracking_number_or_default());
            if let Some(info) = summary.additional_info.as_deref() {
                println!("  Información Adicional: {info}");
            }
            if *can_confirm_receipt {
                println!("  > Confirmar Recepción del Producto");
            }
        }
        ManagementView::Waiting { message } => println!("Estado de Envío: {message}"),
    }
}

pub fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Notice(notice) => match notice.level {
            NoticeLevel::Success => println!("✔ {}", notice.message),
            NoticeLevel::Error => eprintln!("✖ {}", notice.message),
        },
        ClientEvent::SessionExpired => eprintln!("session expired; run `shipctl login` again"),
    }
}

pub fn drain_events(rx: &mut broadcast::Receiver<ClientEvent>) {
    while let Ok(event) = rx.try_recv() {
        print_event(&event);
    }
}
