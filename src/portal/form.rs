// src/portal/form.rs

use scraper::{ElementRef, Html};
use url::Url;

use super::{element_text, selector, Currency, SUBMIT_BUTTON, YEAR_SELECT};
use crate::error::{Result, ScrapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// What a browser would send when the query form is submitted: the form's
/// defaults plus the three controls the pipeline drives.
#[derive(Debug, Clone)]
pub struct FormPlan {
    pub action: Url,
    pub method: FormMethod,
    defaults: Vec<(String, String)>,
    year_field: String,
    year_options: Vec<String>,
    hs_field: String,
    currency_field: (String, String),
    submit_field: Option<(String, String)>,
}

impl FormPlan {
    /// Locate every required control on the query page. A missing control is
    /// a navigation failure: the page is not the one we expect.
    pub fn from_html(html: &str, page_url: &Url, currency: Currency) -> Result<Self> {
        let doc = Html::parse_document(html);

        let form = doc
            .select(&selector("form")?)
            .next()
            .ok_or_else(|| ScrapeError::Navigation("query form not found".into()))?;

        let action = match form.value().attr("action").map(str::trim) {
            Some(a) if !a.is_empty() => page_url
                .join(a)
                .map_err(|e| ScrapeError::Navigation(format!("bad form action {}: {}", a, e)))?,
            _ => page_url.clone(),
        };
        let method = match form.value().attr("method") {
            Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
            _ => FormMethod::Get,
        };

        let year = required(&form, YEAR_SELECT, "year selector")?;
        let year_field = control_name(&year, "year selector")?;
        let year_options = year
            .select(&selector("option")?)
            .map(|o| option_value(&o))
            .collect::<Vec<_>>();

        let hs_input = form
            .select(&selector("table")?)
            .next()
            .and_then(|t| {
                selector(r#"input[type="text"], input:not([type])"#)
                    .ok()
                    .and_then(|s| t.select(&s).next())
            })
            .ok_or_else(|| ScrapeError::Navigation("HS code input not found".into()))?;
        let hs_field = control_name(&hs_input, "HS code input")?;

        let radio = required(&form, currency.radio_selector(), "currency radio")?;
        let currency_field = (
            control_name(&radio, "currency radio")?,
            radio.value().attr("value").unwrap_or("on").to_string(),
        );

        let submit = required(&form, SUBMIT_BUTTON, "submit control")?;
        let submit_field = submit
            .value()
            .attr("name")
            .map(|n| (n.to_string(), submit.value().attr("value").unwrap_or("").to_string()));

        Ok(FormPlan {
            action,
            method,
            defaults: form_defaults(&form)?,
            year_field,
            year_options,
            hs_field,
            currency_field,
            submit_field,
        })
    }

    pub fn offers_year(&self, year: i32) -> bool {
        let year = year.to_string();
        self.year_options.iter().any(|o| *o == year)
    }

    /// Field list for one submission. Fails if the selector does not offer `year`.
    pub fn fill(&self, year: i32, hs_code: &str) -> Result<Vec<(String, String)>> {
        if !self.offers_year(year) {
            return Err(ScrapeError::Navigation(format!(
                "year {} not offered by the year selector",
                year
            )));
        }

        let overridden = [&self.year_field, &self.hs_field, &self.currency_field.0];
        let mut fields: Vec<(String, String)> = self
            .defaults
            .iter()
            .filter(|(name, _)| !overridden.contains(&name))
            .cloned()
            .collect();
        fields.push((self.year_field.clone(), year.to_string()));
        fields.push((self.hs_field.clone(), hs_code.trim().to_string()));
        fields.push(self.currency_field.clone());
        if let Some(submit) = &self.submit_field {
            fields.push(submit.clone());
        }
        Ok(fields)
    }
}

fn required<'a>(form: &ElementRef<'a>, css: &str, what: &str) -> Result<ElementRef<'a>> {
    form.select(&selector(css)?)
        .next()
        .ok_or_else(|| ScrapeError::Navigation(format!("{} ({}) not found", what, css)))
}

fn control_name(el: &ElementRef<'_>, what: &str) -> Result<String> {
    el.value()
        .attr("name")
        .map(str::to_string)
        .ok_or_else(|| ScrapeError::Navigation(format!("{} has no name", what)))
}

fn option_value(option: &ElementRef<'_>) -> String {
    option
        .value()
        .attr("value")
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| element_text(option))
}

/// Successful controls of an untouched form, in document order.
fn form_defaults(form: &ElementRef<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for el in form.select(&selector("input, select, textarea")?) {
        let v = el.value();
        let Some(name) = v.attr("name") else { continue };
        if v.attr("disabled").is_some() {
            continue;
        }
        match v.name() {
            "input" => {
                let ty = v.attr("type").unwrap_or("text").to_ascii_lowercase();
                match ty.as_str() {
                    "submit" | "button" | "reset" | "image" | "file" => {}
                    "checkbox" | "radio" => {
                        if v.attr("checked").is_some() {
                            out.push((name.to_string(), v.attr("value").unwrap_or("on").to_string()));
                        }
                    }
                    _ => out.push((name.to_string(), v.attr("value").unwrap_or("").to_string())),
                }
            }
            "select" => {
                let options: Vec<ElementRef<'_>> = el.select(&selector("option")?).collect();
                let chosen = options
                    .iter()
                    .find(|o| o.value().attr("selected").is_some())
                    .or_else(|| options.first());
                if let Some(o) = chosen {
                    out.push((name.to_string(), option_value(o)));
                }
            }
            "textarea" => out.push((name.to_string(), el.text().collect())),
            _ => {}
        }
    }
    Ok(out)
}
