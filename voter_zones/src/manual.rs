/*!

This is the long-form manual for `voter_zones` and `voteringest`.

## Input formats

The following formats are supported:
* `.xlsx` Excel workbooks. The header is the first row. The worksheet can be
  chosen with `--sheet`; otherwise the `MASTER DATA to Import` worksheet is
  used when it exists, and the first worksheet when it does not.
* `.csv` Comma Separated Values. The header is the first line, fields may be
  quoted with `"` and quotes are escaped by doubling them (`""`).

The format is chosen from the file extension.

### Columns

Columns are found by looking for a fragment of their name in the header,
ignoring the case. The order of the columns does not matter.

| field          | header contains                      | required |
|----------------|--------------------------------------|----------|
| voter id       | `vid`, `voter id`, `voter no`        | yes      |
| name           | `name`                               | yes      |
| voting region  | `region`, `zone`                     | yes      |
| date of birth  | `dob`, `birth`                       |          |
| age            | `age`                                |          |
| mobile         | `mobile`, `phone`, `contact`         |          |
| email          | `mail`                               |          |
| address        | `address`                            |          |
| city           | `city`, `town`                       |          |
| state          | `state`                              |          |
| family number  | `family no`, `family number`         |          |

A run stops before reading any row if a required column is missing.
Rows where every cell is empty are ignored.

### Field formats

Mobile numbers are reduced to their digits. Ten digits are kept as is, twelve
digits starting with the `91` country code lose the country code, everything
else is treated as missing:

```
use voter_zones::normalize::normalize_phone;

assert_eq!(normalize_phone("+91 98765 43210"), Some("9876543210".to_string()));
assert_eq!(normalize_phone("NA"), None);
assert_eq!(normalize_phone("98765"), None);
```

Dates of birth are written `DD/MM/YYYY` or `DD-MM-YYYY`. Two digit years
from `50` are in the 1900s, below `50` in the 2000s. Dates stored as dates in
the workbook are also accepted.

```
use chrono::NaiveDate;
use voter_zones::normalize::{age_on, format_dob, parse_dob_text};

let dob = parse_dob_text("5-6-80").unwrap();
assert_eq!(format_dob(dob), "05/06/1980");
assert_eq!(age_on(dob, NaiveDate::from_ymd_opt(2025, 6, 4).unwrap()), 44);
```

## Zones

Every voter can vote in up to three elections: the youth wing (ages 18 to 39),
the trade body and the trustee board (18 and above). The voting region of the
voter selects one zone code for each election type. The region is looked up
after applying the alias table (alternate spellings) and the city splits
(a composite region split in two depending on the city of the voter).

Regions that are not in the table use the default region. Each such voter is
reported in the `defaultRegionFallbacks` section of the run summary, because
it usually points at a typo in the source file.

The youth wing codes can be limited to an allow-list. Codes outside the list
are not activated even if the region maps to them.

The primary zone, stored on the `region` field of the voter, is the trade body
zone if there is one, then the trustee zone, then the youth wing zone. Voters
without any zone are not stored.

## Store

Voters and their accounts are stored in an SQLite database. The zone table
must be loaded first with `voteringest seed-zones zones.json`.

In `insert` mode, a voter id already in the database is counted as a duplicate
and the row is skipped. In `upsert` mode, an existing voter is updated in place.

Voters without a valid mobile number get a placeholder number
`9999` + the last 4 digits of their voter id + 2 digits of their row number,
and, when the row has no email either, a placeholder email
`<number>@voter.<domain>`. Voters with a real number keep an empty email. The
same row of the same file always produces the same placeholder.

A date of birth that cannot be read is replaced by the age column. These rows
are counted in the `dobFallbacks` entry of the summary.

*/
