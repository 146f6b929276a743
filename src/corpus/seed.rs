//! Built-in product catalog used when the corpus has no products yet.

use tracing::{info, warn};

use crate::corpus::document::{Document, DocumentAttributes, DocumentKind, UpsertOutcome};
use crate::corpus::Corpus;

struct SeedProduct {
    slug: &'static str,
    title: &'static str,
    brand: &'static str,
    model: &'static str,
    category: &'static str,
    price: &'static str,
    engine_size: &'static str,
    horsepower: &'static str,
    content: &'static str,
}

const SEED_PRODUCTS: [SeedProduct; 5] = [
    SeedProduct {
        slug: "bmw-s1000-rr",
        title: "BMW S1000 RR",
        brand: "BMW",
        model: "S1000 RR",
        category: "Sport Motorcycle",
        price: "$17,995",
        engine_size: "999cc",
        horsepower: "205",
        content: "BMW S1000 RR - The Ultimate Sport Motorcycle. Price: $17,995 MSRP. \
Engine: 999cc inline-four. Power: 205 horsepower. Torque: 83 lb-ft. Weight: 434 lbs (wet). \
Track-focused machine with Dynamic Traction Control, ABS Pro with cornering capability, \
riding modes Rain, Road, Dynamic and Race, lightweight aluminum frame, electronically \
adjustable suspension, winglets, full LED lighting and a 6.5-inch TFT display. \
Colors: Light White, Racing Red, Black Storm Metallic. \
Warranty: 3-year unlimited mileage warranty. Financing: rates starting at 3.9% APR.",
    },
    SeedProduct {
        slug: "bmw-r1250-gs",
        title: "BMW R1250 GS",
        brand: "BMW",
        model: "R1250 GS",
        category: "Adventure Motorcycle",
        price: "$18,895",
        engine_size: "1254cc",
        horsepower: "136",
        content: "BMW R1250 GS - The Adventure Motorcycle Legend. Price: $18,895 MSRP. \
Engine: 1254cc boxer twin with ShiftCam technology. Power: 136 horsepower. Torque: 105 lb-ft. \
Weight: 549 lbs (wet). Excels on and off-road with Dynamic ESA electronic suspension, \
ABS Pro, multiple riding modes, LED lighting, a 10.25-inch TFT display with navigation, \
heated comfort seat and crash bars. Colors: Alpine White, Black Storm Metallic, Rallye Blue. \
Warranty: 3-year unlimited mileage warranty. Financing: rates starting at 3.9% APR.",
    },
    SeedProduct {
        slug: "honda-cbr1000rr-r",
        title: "Honda CBR1000RR-R Fireblade",
        brand: "Honda",
        model: "CBR1000RR-R Fireblade",
        category: "Sport Motorcycle",
        price: "$16,799",
        engine_size: "999.9cc",
        horsepower: "217",
        content: "Honda CBR1000RR-R Fireblade - Precision Engineering. Price: $16,799 MSRP. \
Engine: 999.9cc inline-four. Power: 217 horsepower. Torque: 83 lb-ft. Weight: 441 lbs (wet). \
MotoGP-inspired machine with Honda Selectable Torque Control, cornering ABS, multiple power \
modes, Ohlins electronic suspension, winglets, full LED lighting and a 5-inch TFT display. \
Colors: Grand Prix Red, Pearl White. \
Warranty: 1-year unlimited mileage warranty. Financing: rates starting at 4.9% APR.",
    },
    SeedProduct {
        slug: "yamaha-yzf-r1",
        title: "Yamaha YZF-R1",
        brand: "Yamaha",
        model: "YZF-R1",
        category: "Sport Motorcycle",
        price: "$18,099",
        engine_size: "998cc",
        horsepower: "200",
        content: "Yamaha YZF-R1 - The R-Series Legend. Price: $18,099 MSRP. \
Engine: 998cc crossplane inline-four. Power: 200 horsepower. Torque: 83 lb-ft. \
Weight: 448 lbs (wet). Race-proven performance with Yamaha Chip Controlled Throttle, \
Traction Control, Slide Control and Lift Control systems, Ohlins electronic suspension, \
full LED lighting and a 6.1-inch TFT display. Colors: Team Yamaha Blue, Matte Black. \
Warranty: 1-year unlimited mileage warranty. Financing: rates starting at 4.9% APR.",
    },
    SeedProduct {
        slug: "kawasaki-ninja-zx-10r",
        title: "Kawasaki Ninja ZX-10R",
        brand: "Kawasaki",
        model: "Ninja ZX-10R",
        category: "Sport Motorcycle",
        price: "$16,599",
        engine_size: "998cc",
        horsepower: "203",
        content: "Kawasaki Ninja ZX-10R - World Superbike Champion. Price: $16,599 MSRP. \
Engine: 998cc inline-four. Power: 203 horsepower. Torque: 83 lb-ft. Weight: 456 lbs (wet). \
Street version of the championship-winning machine with Kawasaki Traction Control, \
Intelligent anti-lock Brake System, Launch Control Mode, Engine Brake Control, Ohlins \
electronic suspension, winglets, full LED lighting and a 4.3-inch TFT display. \
Colors: Lime Green, Metallic Carbon Gray. \
Warranty: 1-year unlimited mileage warranty. Financing: rates starting at 4.9% APR.",
    },
];

/// The built-in catalog as product documents.
#[must_use]
pub fn seed_products() -> Vec<Document> {
    SEED_PRODUCTS
        .iter()
        .map(|product| {
            Document::page(
                format!("https://bigbikeblitz.com/products/{}", product.slug),
                product.title,
                product.content,
            )
            .with_kind(DocumentKind::Product)
            .with_attributes(DocumentAttributes {
                brand: Some(product.brand.to_string()),
                model: Some(product.model.to_string()),
                category: Some(product.category.to_string()),
                price: Some(product.price.to_string()),
                engine_size: Some(product.engine_size.to_string()),
                horsepower: Some(product.horsepower.to_string()),
                year: Some("2024".to_string()),
                ..DocumentAttributes::default()
            })
        })
        .collect()
}

/// Upsert the built-in catalog when the corpus holds no product. Returns the number
/// of documents added.
pub async fn seed_products_if_missing(corpus: &dyn Corpus) -> usize {
    if !corpus.documents_by_kind(DocumentKind::Product).await.is_empty() {
        return 0;
    }

    let mut added = 0;
    for product in seed_products() {
        let title = product.title.clone();
        match corpus.upsert(product).await {
            Ok(UpsertOutcome::Added) => added += 1,
            Ok(_) => {}
            Err(err) => warn!("Failed to seed product {title}: {err}"),
        }
    }
    info!("Seeded {added} products into the corpus");
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::JsonCorpus;

    #[tokio::test]
    async fn test_seeds_once() {
        let corpus = JsonCorpus::in_memory();
        assert_eq!(seed_products_if_missing(&corpus).await, 5);
        assert_eq!(seed_products_if_missing(&corpus).await, 0);
        assert_eq!(corpus.count().await, 5);
    }

    #[tokio::test]
    async fn test_seeded_products_are_searchable_by_brand() {
        let corpus = JsonCorpus::in_memory();
        seed_products_if_missing(&corpus).await;
        let results = corpus.search("kawasaki", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.attributes.price.as_deref(), Some("$16,599"));
    }
}
