pub mod canceled_item;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod customer;
pub mod customer_address;
pub mod delivered_item;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod shipment;

// Re-export entities
pub use canceled_item::{Entity as CanceledItem, Model as CanceledItemModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use customer::{Entity as Customer, Model as CustomerModel};
pub use customer_address::{Entity as CustomerAddress, Model as CustomerAddressModel};
pub use delivered_item::{Entity as DeliveredItem, Model as DeliveredItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentMethod, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use shipment::{Entity as Shipment, Model as ShipmentModel, ShipmentStatus};
