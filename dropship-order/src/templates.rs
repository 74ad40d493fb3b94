use dropship_core::catalog::Product;
use dropship_core::identity::Dropshipper;
use dropship_shared::format_guarani;
use std::fmt::Write;

use crate::ledger::short_id;
use crate::models::Order;
use crate::notification::RecipientType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

pub struct MessageContext<'a> {
    pub order: &'a Order,
    pub product: &'a Product,
    pub dropshipper: Option<&'a Dropshipper>,
    pub brand_name: &'a str,
}

pub fn render(recipient: RecipientType, ctx: &MessageContext<'_>) -> RenderedMessage {
    match recipient {
        RecipientType::Customer => customer_message(ctx),
        RecipientType::Dropshipper => dropshipper_message(ctx),
        RecipientType::Company => company_message(ctx),
    }
}

fn customer_message(ctx: &MessageContext<'_>) -> RenderedMessage {
    let order = ctx.order;
    let mut body = String::new();
    let _ = writeln!(body, "Hola {},", order.customer.name);
    let _ = writeln!(body);
    let _ = writeln!(body, "Recibimos tu pedido #{}. Estos son los detalles:", short_id(order.id));
    let _ = writeln!(body);
    order_lines(&mut body, ctx);
    let _ = writeln!(body, "Entrega: {}", order.delivery.summary());
    let _ = writeln!(body);
    let _ = writeln!(body, "Te avisaremos cuando tu pedido esté en camino.");
    let _ = writeln!(body, "Gracias por comprar en {}.", ctx.brand_name);

    RenderedMessage {
        subject: format!("Pedido confirmado #{} - {}", short_id(order.id), ctx.brand_name),
        body,
    }
}

fn dropshipper_message(ctx: &MessageContext<'_>) -> RenderedMessage {
    let order = ctx.order;
    let greeting = ctx.dropshipper.map(|d| d.name.as_str()).unwrap_or("vendedor");

    let mut body = String::new();
    let _ = writeln!(body, "Hola {},", greeting);
    let _ = writeln!(body);
    let _ = writeln!(body, "Registraste una nueva venta, pedido #{}.", short_id(order.id));
    let _ = writeln!(body);
    order_lines(&mut body, ctx);
    commission_lines(&mut body, order);
    let _ = writeln!(body, "Cliente: {}", order.customer.name);
    let _ = writeln!(body, "Entrega: {}", order.delivery.summary());
    let _ = writeln!(body);
    let _ = writeln!(body, "La comisión ya fue acreditada en tu billetera.");

    RenderedMessage {
        subject: format!("¡Nueva venta! Pedido #{}", short_id(order.id)),
        body,
    }
}

fn company_message(ctx: &MessageContext<'_>) -> RenderedMessage {
    let order = ctx.order;
    let mut body = String::new();
    let _ = writeln!(body, "Nuevo pedido #{} ({})", short_id(order.id), order.id);
    let _ = writeln!(body);
    order_lines(&mut body, ctx);
    commission_lines(&mut body, order);
    let _ = writeln!(body);

    match ctx.dropshipper {
        Some(d) => {
            let _ = writeln!(
                body,
                "Vendedor: {} <{}>",
                d.name,
                d.email.as_deref().unwrap_or("sin correo")
            );
        }
        None => {
            let _ = writeln!(body, "Vendedor: {}", order.dropshipper_id);
        }
    }

    let _ = writeln!(body, "Cliente: {}", order.customer.name);
    let _ = writeln!(body, "Teléfono: {}", order.customer.phone.inner());
    if let Some(email) = &order.customer.email {
        let _ = writeln!(body, "Correo: {}", email);
    }
    if let Some(id_number) = &order.customer.id_number {
        let _ = writeln!(body, "Documento: {}", id_number.inner());
    }
    let _ = writeln!(body, "Dirección: {}", order.delivery.summary());
    if let Some(postal) = &order.delivery.postal_code {
        let _ = writeln!(body, "Código postal: {}", postal);
    }
    if let Some(location) = &order.delivery.maps_location {
        let _ = writeln!(body, "Ubicación: {}", location);
    }
    if let Some(notes) = &order.notes {
        let _ = writeln!(body, "Notas: {}", notes);
    }

    RenderedMessage {
        subject: format!("Nuevo pedido #{}", short_id(order.id)),
        body,
    }
}

fn order_lines(body: &mut String, ctx: &MessageContext<'_>) {
    let order = ctx.order;
    let _ = writeln!(body, "Producto: {}", ctx.product.name);
    let _ = writeln!(body, "Cantidad: {}", order.quantity);
    let _ = writeln!(body, "Precio unitario: {}", format_guarani(order.unit_price));
    let _ = writeln!(body, "Total: {}", format_guarani(order.total_amount));
    let _ = writeln!(body, "Forma de pago: {}", order.payment_method.label());
}

fn commission_lines(body: &mut String, order: &Order) {
    let _ = writeln!(
        body,
        "Comisión ({}%): {}",
        order.commission_percentage.normalize(),
        format_guarani(order.commission_amount)
    );
    let _ = writeln!(body, "Ganancia por unidad: {}", format_guarani(order.profit_per_unit()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerContact, DeliveryDetails, OrderStatus, PaymentMethod};
    use chrono::Utc;
    use dropship_shared::Masked;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn fixture() -> (Order, Product, Dropshipper) {
        let product = Product {
            id: Uuid::new_v4(),
            name: "Freidora de aire".to_string(),
            wholesale_price: dec!(100000),
            suggested_retail_price: dec!(150000),
            commission_percentage: Some(dec!(15)),
            min_commission: None,
            max_commission: None,
            stock: 5,
            is_active: true,
        };
        let dropshipper = Dropshipper {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: Some("ana@shop.test".to_string()),
        };
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            dropshipper_id: dropshipper.id,
            product_id: product.id,
            customer: CustomerContact {
                name: "Carlos".to_string(),
                phone: Masked::new("0981 123 456".to_string()),
                email: Some("carlos@mail.test".to_string()),
                id_number: None,
            },
            delivery: DeliveryDetails {
                address: "Calle Palma 100".to_string(),
                city: Some("Asunción".to_string()),
                department: None,
                postal_code: None,
                maps_location: None,
            },
            payment_method: PaymentMethod::CashOnDelivery,
            quantity: 2,
            unit_price: dec!(150000),
            total_amount: dec!(300000),
            commission_percentage: dec!(15),
            commission_amount: dec!(45000),
            status: OrderStatus::Pending,
            notes: None,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        };
        (order, product, dropshipper)
    }

    #[test]
    fn test_customer_message_hides_commission() {
        let (order, product, dropshipper) = fixture();
        let ctx = MessageContext {
            order: &order,
            product: &product,
            dropshipper: Some(&dropshipper),
            brand_name: "La Hora de las Compras",
        };

        let msg = render(RecipientType::Customer, &ctx);
        assert!(msg.subject.starts_with("Pedido confirmado #"));
        assert!(msg.body.contains("Total: ₲ 300.000"));
        assert!(msg.body.contains("Pago contra entrega"));
        assert!(!msg.body.contains("Comisión"));
    }

    #[test]
    fn test_dropshipper_and_company_messages_show_commission() {
        let (order, product, dropshipper) = fixture();
        let ctx = MessageContext {
            order: &order,
            product: &product,
            dropshipper: Some(&dropshipper),
            brand_name: "La Hora de las Compras",
        };

        let seller = render(RecipientType::Dropshipper, &ctx);
        assert!(seller.subject.starts_with("¡Nueva venta!"));
        assert!(seller.body.contains("Comisión (15%): ₲ 45.000"));
        assert!(seller.body.contains("Ganancia por unidad: ₲ 22.500"));

        let company = render(RecipientType::Company, &ctx);
        assert!(company.body.contains("Vendedor: Ana <ana@shop.test>"));
        assert!(company.body.contains("Teléfono: 0981 123 456"));
        assert!(company.body.contains(&order.id.to_string()));
    }
}
