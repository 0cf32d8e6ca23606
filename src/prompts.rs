//! Prompts for LLM-based menu structuring.
//!
//! Every prompt lives here so prompt changes touch exactly one file and unit
//! tests can inspect them without a model.
//!
//! The user message carries two worked examples. The first shows the plain
//! three-column shape (`Category|Item|Price`); the second a four-column shape
//! whose `Description` is often absent. Together they teach the model that the
//! column count varies per menu and that an absent field is still written as
//! an empty slot (`||`), so every row keeps the same positions.

use crate::pipeline::llm::PromptMessage;

/// Fixed system message.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that formats text into structured data.";

/// Instructions preceding the examples.
pub const INSTRUCTIONS: &str = "Parse the following text and structure it into an Excel-compatible format. \
Use '|' as the delimiter for each column in the output. Be flexible with the number of columns, \
and adjust the structure as needed based on the content. Do not write anything else or break format. \
Here are examples of the expected format, which you should adapt as necessary:";

/// Example 1: three columns, every field present.
pub const EXAMPLE_SIMPLE: &str = r#"Example 1:
Text to parse:
FOOD MENU
Paucek and Lage Restaurant
MAIN COURSE
Cheeseburger
$34
Cheese sandwich
$22
Chicken burgers
$23
Spicy chicken
$33
Hot dog
$24
APPETIZERS
Fruit Salad
$13
Cocktails
$12
Nuggets
$14
Sandwich
$13
French Fries
$15
BEVERAGES
Milk Shake
$3
Iced Tea
$2
Orange Juice
$4
Lemon Tea
$3
Coffee
$5
123-456-7890
123 Anywhere St ., Any City

Expected output:
Category|Item|Price
MAIN COURSE|Cheeseburger|$34
MAIN COURSE|Cheese sandwich|$22
MAIN COURSE|Chicken burgers|$23
MAIN COURSE|Spicy chicken|$33
MAIN COURSE|Hot dog|$24
APPETIZERS|Fruit Salad|$13
APPETIZERS|Cocktails|$12
APPETIZERS|Nuggets|$14
APPETIZERS|Sandwich|$13
APPETIZERS|French Fries|$15
BEVERAGES|Milk Shake|$3
BEVERAGES|Iced Tea|$2
BEVERAGES|Orange Juice|$4
BEVERAGES|Lemon Tea|$3
BEVERAGES|Coffee|$5"#;

/// Example 2: four columns with an optional, often empty, description.
pub const EXAMPLE_WITH_DESCRIPTIONS: &str = r#"Example 2:
Text to parse:
ME
Appetizer.
Garlic Bread
6.99
NU
Potato Wedges
6.99
Meat Ball
6.99
Onion Rings
6.99
French Fries
6.99
Ratatouille
6.99
Main Course.
Chef's Specials.
Grilled Fingerlings
6.99
Grilled potatoes with a Western flair served with sauce of choice.
Asian Pear Salad
6.99
Crisp pears and pecans with tender frisée, and maple syrup with cheese.
Roasted Acorn Squash
6.99
Spicy-sweet, soft wedges potatoes which makes a no-fuss holiday meal.
Smothered Chicken
6.99
Grilled chicken breast topped with mushrooms, onions and Cheese.
Dessert.
Banana Split
6.99
Cheese Cake
6.99
Chocolate Ice Cream
6.99
Fruit Cake
6.99
Drinks.
Coffee
6.99
Ice / Hot Tea
6.99
Thai Tea
6.99
Soda
6.99

Expected output:
Category|Item|Description|Price
Appetizer|Garlic Bread||6.99
Appetizer|Potato Wedges||6.99
Appetizer|Meat Ball||6.99
Appetizer|Onion Rings||6.99
Appetizer|French Fries||6.99
Appetizer|Ratatouille||6.99
Main Course|Grilled Fingerlings|Grilled potatoes with a Western flair served with sauce of choice.|6.99
Main Course|Asian Pear Salad|Crisp pears and pecans with tender frisée, and maple syrup with cheese.|6.99
Main Course|Roasted Acorn Squash|Spicy-sweet, soft wedges potatoes which makes a no-fuss holiday meal.|6.99
Main Course|Smothered Chicken|Grilled chicken breast topped with mushrooms, onions and Cheese.|6.99
Dessert|Banana Split||6.99
Dessert|Cheese Cake||6.99
Dessert|Chocolate Ice Cream||6.99
Dessert|Fruit Cake||6.99
Drinks|Coffee||6.99
Drinks|Ice / Hot Tea||6.99
Drinks|Thai Tea||6.99
Drinks|Soda||6.99"#;

/// Lead-in placed right before the menu text.
pub const TASK_LEAD_IN: &str = "Now, parse the following text.";

/// Build the user message: instructions, both examples, then the menu text.
pub fn structuring_request(menu_text: &str) -> String {
    format!(
        "{INSTRUCTIONS}\n\n{EXAMPLE_SIMPLE}\n\n{EXAMPLE_WITH_DESCRIPTIONS}\n\n{TASK_LEAD_IN}\n\n{menu_text}"
    )
}

/// Build the full chat request for one structuring call.
pub fn build_messages(menu_text: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(SYSTEM_PROMPT),
        PromptMessage::user(structuring_request(menu_text)),
    ]
}
