/*!

This is the long-form manual for `vote_reconcile` and `satrep`.

## Recording paths

Customer satisfaction reaches the store through two independent paths:
* feedback submissions: a form with an optional overall category and a list of answers, one per question.
* standalone votes: a single tap on a device, with one category and no form.

A customer may use both for the same visit. The two paths share no identifier, so the same
interaction can be recorded twice. `reconcile` returns one signal per interaction.

## Categories

| name           | score | label             |
|----------------|-------|-------------------|
| `superlike`    | 5     | Very Satisfied    |
| `like`         | 4     | Satisfied         |
| `neutral`      | 3     | Neutral           |
| `dislike`      | 2     | Dissatisfied      |
| `superdislike` | 1     | Very Dissatisfied |

An average maps back to a category with the inclusive lower bounds 4.5, 3.5, 2.5 and 1.5.

## Reconciliation

A submission is scored with the average of its answers. The overall category is only used when
none of the answers carries a category. A submission without any category is ignored.

A standalone vote is dropped when:
* it carries a link to a submission, or
* a submission of the same account (case does not matter) and the same device
  - was made at most 5 minutes before or after the vote,
  - is about the same question, or one of the two does not name a question,
  - has an overall category equal to the vote, or an average within 0.51 of the vote's score.

Both tolerances are part of `ReconcileRules` and can be changed in the `rules` section of the
configuration.

## Configuration

```json
{
  "outputSettings": { "reportName": "Lobby kiosk, January" },
  "query": {
    "account": "acme",
    "startDate": "2024-01-01",
    "endDate": "2024-01-31",
    "granularity": "day"
  },
  "recordSources": [
    { "provider": "json", "filePath": "export.json" },
    { "provider": "csv", "filePath": "taps.csv", "recordKind": "votes" },
    { "provider": "xlsx", "filePath": "forms.xlsx", "recordKind": "feedback", "excelWorksheetName": "Sheet1" }
  ],
  "rules": { "visitWindowMinutes": 5, "scoreTolerance": 0.51 }
}
```

Dates are inclusive. A date without a time covers the whole day (UTC). Hourly timelines are only
accepted for a single day.

## Input formats

### `json`

```json
{
  "feedback": [
    { "account": "acme", "createdAt": "2024-01-01T10:00:00Z", "overall": "like",
      "votes": [ { "question": "Service", "vote": "superlike" } ],
      "device": { "deviceId": "D1" } }
  ],
  "votes": [
    { "account": "acme", "createdAt": "2024-01-01T10:03:00Z", "vote": "like",
      "question": null, "device": "D1", "feedbackId": null }
  ]
}
```

The device may be a string, a number, or an object with one of the fields `deviceId`, `id`, `_id`
or `name`.

### `csv` and `xlsx`

One record kind per file (or worksheet), with a header row.
* feedback: `account, timestamp, overall, device, question 1, vote 1, question 2, vote 2, ...`
* votes: `account, timestamp, vote, question, device, feedbackLink`

For Excel files, `recordKind: all` reads the worksheets `feedback` and `votes`, whatever the case of
their names. Otherwise the worksheet is the one named by `excelWorksheetName`, or the only worksheet
of the workbook: a workbook with several worksheets needs a name.

## Migration

Older exports embed devices in several shapes. `satrep --migrate-out normalized.json` reads all the
configured sources and writes them back as one canonical JSON export. Reports never rewrite their
inputs.

*/
