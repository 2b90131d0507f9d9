pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const INGREDIENT_COUNT_PER_PAGE: i64 = 50;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 6;

/// Tag colors are stored as `#RRGGBB`.
pub const TAG_COLOR_LEN: usize = 7;
pub const TAG_SLUG_MAX_LEN: usize = 15;

pub const SHOPPING_LIST_FILENAME: &str = "cart.pdf";
pub const SHOPPING_LIST_CONTENT_TYPE: &str = "application/pdf";
pub const SHOPPING_LIST_HEADER: &str = "Shopping list:";

// A4 geometry for the shopping-list report, in millimeters.
pub const REPORT_PAGE_WIDTH: f32 = 210.0;
pub const REPORT_PAGE_HEIGHT: f32 = 297.0;
pub const REPORT_MARGIN_LEFT: f32 = 25.0;
pub const REPORT_HEADER_Y: f32 = 270.0;
pub const REPORT_FIRST_ENTRY_Y: f32 = 255.0;
pub const REPORT_LINE_STEP: f32 = 9.0;
pub const REPORT_BOTTOM_MARGIN: f32 = 20.0;
pub const REPORT_HEADER_SIZE: f32 = 22.0;
pub const REPORT_ENTRY_SIZE: f32 = 12.0;

pub const MEDIA_RECIPE_DIR: &str = "recipes";
