use std::collections::HashMap;
use std::io::BufWriter;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::Response;

use crate::constants::{
    REPORT_BOTTOM_MARGIN, REPORT_ENTRY_SIZE, REPORT_FIRST_ENTRY_Y, REPORT_HEADER_SIZE,
    REPORT_HEADER_Y, REPORT_LINE_STEP, REPORT_MARGIN_LEFT, REPORT_PAGE_HEIGHT, REPORT_PAGE_WIDTH,
    SHOPPING_LIST_CONTENT_TYPE, SHOPPING_LIST_FILENAME, SHOPPING_LIST_HEADER,
};
use crate::error::ApiError;
use crate::schema::{AggregatedIngredient, CartIngredientRow};

/// Merges cart ingredient rows by display name. The storage layer already
/// sums per ingredient id; distinct ids sharing a name are folded here in a
/// single pass. The first-seen line fixes the unit; later lines with the same
/// name only add to the amount. The merged list is sorted by name so the
/// rendered report is stable across requests.
pub fn merge_by_name(rows: Vec<CartIngredientRow>) -> Vec<AggregatedIngredient> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<AggregatedIngredient> = Vec::new();

    for row in rows {
        match index.get(&row.name) {
            Some(&at) => merged[at].amount += row.amount,
            None => {
                index.insert(row.name.clone(), merged.len());
                merged.push(AggregatedIngredient {
                    name: row.name,
                    amount: row.amount,
                    unit: row.measurement_unit,
                });
            }
        }
    }

    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

pub fn format_entry(item: &AggregatedIngredient) -> String {
    format!("- {} - {} {}", item.name, item.amount, item.unit)
}

/// Renders the shopping list as a PDF, one entry per line under a fixed
/// header. The vertical cursor decreases per entry; when it would run past
/// the bottom margin a new page is started. An empty list yields a document
/// with only the header.
pub fn render_shopping_list(items: &[AggregatedIngredient]) -> Result<Vec<u8>, ApiError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        "Shopping list",
        Mm(REPORT_PAGE_WIDTH),
        Mm(REPORT_PAGE_HEIGHT),
        "list",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ApiError::Query(format!("Failed to load report font: {e}")))?;

    let mut layer: PdfLayerReference = doc.get_page(first_page).get_layer(first_layer);
    draw_line(
        &layer,
        &font,
        SHOPPING_LIST_HEADER,
        REPORT_HEADER_SIZE,
        REPORT_HEADER_Y,
    );

    let mut y = REPORT_FIRST_ENTRY_Y;
    for item in items {
        if y < REPORT_BOTTOM_MARGIN {
            let (page, page_layer) =
                doc.add_page(Mm(REPORT_PAGE_WIDTH), Mm(REPORT_PAGE_HEIGHT), "list");
            layer = doc.get_page(page).get_layer(page_layer);
            y = REPORT_FIRST_ENTRY_Y;
        }
        draw_line(&layer, &font, &format_entry(item), REPORT_ENTRY_SIZE, y);
        y -= REPORT_LINE_STEP;
    }

    let mut bytes: Vec<u8> = Vec::new();
    doc.save(&mut BufWriter::new(&mut bytes))
        .map_err(|e| ApiError::Query(format!("Failed to render shopping list: {e}")))?;
    Ok(bytes)
}

fn draw_line(layer: &PdfLayerReference, font: &IndirectFontRef, text: &str, size: f32, y: f32) {
    layer.use_text(text, size, Mm(REPORT_MARGIN_LEFT), Mm(y), font);
}

/// Wraps rendered bytes into the download response:
/// `Content-Type: application/pdf`, attachment filename `cart.pdf`.
pub fn shopping_list_response(bytes: Vec<u8>) -> Result<Response<Vec<u8>>, ApiError> {
    Response::builder()
        .header(CONTENT_TYPE, SHOPPING_LIST_CONTENT_TYPE)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
        )
        .body(bytes)
        .map_err(|e| ApiError::Query(format!("Failed to build report response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, amount: i64, unit: &str) -> CartIngredientRow {
        CartIngredientRow {
            name: name.to_string(),
            amount,
            measurement_unit: unit.to_string(),
        }
    }

    #[test]
    fn sums_amounts_per_name() {
        // Recipe A: Salt 5 g, Recipe B: Salt 3 g.
        let merged = merge_by_name(vec![row("Salt", 5, "g"), row("Salt", 3, "g")]);
        assert_eq!(
            merged,
            vec![AggregatedIngredient {
                name: String::from("Salt"),
                amount: 8,
                unit: String::from("g"),
            }]
        );
    }

    #[test]
    fn total_amount_is_preserved_across_names() {
        let rows = vec![
            row("Salt", 5, "g"),
            row("Flour", 200, "g"),
            row("Salt", 3, "g"),
            row("Egg", 2, "pcs"),
            row("Flour", 100, "g"),
        ];
        let input_total: i64 = rows.iter().map(|r| r.amount).sum();
        let merged = merge_by_name(rows);
        let merged_total: i64 = merged.iter().map(|m| m.amount).sum();
        assert_eq!(merged_total, input_total);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn first_seen_unit_wins() {
        let merged = merge_by_name(vec![row("Salt", 5, "g"), row("Salt", 1, "pcs")]);
        assert_eq!(merged[0].unit, "g");
        assert_eq!(merged[0].amount, 6);
    }

    #[test]
    fn output_is_sorted_by_name() {
        let merged = merge_by_name(vec![row("Zucchini", 1, "pcs"), row("Apple", 2, "pcs")]);
        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Zucchini"]);
    }

    #[test]
    fn empty_cart_merges_to_empty_list() {
        assert!(merge_by_name(vec![]).is_empty());
    }

    #[test]
    fn entry_format() {
        let item = AggregatedIngredient {
            name: String::from("Salt"),
            amount: 8,
            unit: String::from("g"),
        };
        assert_eq!(format_entry(&item), "- Salt - 8 g");
    }

    #[test]
    fn empty_list_renders_header_only_document() {
        let bytes = render_shopping_list(&[]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(!bytes.is_empty());
    }

    #[test]
    fn long_list_spills_onto_further_pages() {
        let items: Vec<AggregatedIngredient> = (0..120)
            .map(|n| AggregatedIngredient {
                name: format!("Ingredient {n}"),
                amount: n + 1,
                unit: String::from("g"),
            })
            .collect();
        let one_page = render_shopping_list(&items[..5]).unwrap();
        let many_pages = render_shopping_list(&items).unwrap();
        assert!(many_pages.starts_with(b"%PDF"));
        assert!(many_pages.len() > one_page.len());
    }

    #[test]
    fn response_carries_download_headers() {
        let response = shopping_list_response(b"%PDF-1.4".to_vec()).unwrap();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        assert_eq!(
            response.headers().get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"cart.pdf\""
        );
    }
}
